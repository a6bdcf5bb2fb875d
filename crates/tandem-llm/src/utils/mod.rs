pub mod stream_accumulator;
