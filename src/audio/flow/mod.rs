pub mod assembler;

pub use assembler::FrameAssembler;
