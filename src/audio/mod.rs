pub mod buffer;
pub mod constants;
pub mod flow;
pub mod frame;
pub mod pipeline;
pub mod resource;

pub use buffer::{BufferHealth, JitterBuffer};
pub use flow::FrameAssembler;
pub use frame::{Frame, PcmFormat};
pub use pipeline::{
    PipelineEvent, PipelineEventKind, PipelineExit, PipelineHandle, PipelineSpawner,
    ProcessSpawner,
};
pub use resource::{AudioResource, ResourceInput, ResourceOptions, StreamType};
