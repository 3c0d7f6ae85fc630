pub mod assembler;
pub mod encoder;
