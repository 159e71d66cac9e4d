//! EPD engine: partitioning, worker processes, merging and the job controller.
mod boundary;
mod control;
mod decode;
mod engine;
mod filename;
mod filter;
mod merge;
mod partition;
mod persist;
mod pool;
mod reader;
mod status;
mod types;
mod worker;

pub use control::{Checkpoint, ControlSignal};
pub use decode::{decode_record, DecodeError, DecodedRecord};
pub use engine::{EngineConfig, JobController, StartError};
pub use filename::{chunk_temp_name, chunk_temp_path};
pub use filter::{FilterError, PassThroughFilter, PgnRecordFilter, RecordFilter};
pub use merge::{discard_chunks, finalize_chunks, merge_chunks, MergeError, MergeSummary};
pub use partition::{partition_input, ChunkRange, Partition, PartitionError};
pub use persist::{
    ensure_output_dir, parent_dir, remove_temp, validate_paths, AtomicFileWriter, PersistError,
};
pub use pool::{
    ChannelProgressSink, LaunchError, ProcessLauncher, ProgressSink, ThreadLauncher,
    WorkerHandle, WorkerLauncher, WorkerPool,
};
pub use reader::{open_chunk, RecordReader};
pub use status::StatusBroadcaster;
pub use types::{ControlCommand, WorkerAssignment, WorkerReport};
pub use worker::{run_chunk, worker_main, ChunkSummary, JsonLinesSink, ReportSink, WorkerError};
