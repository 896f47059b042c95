pub mod abi;
mod allocator;
pub mod array;
pub mod config;
pub mod dispatch;
pub mod error;
mod monitor;
pub mod natives;
pub mod object;
mod reference;
pub mod start;
pub mod string;
pub mod thread;
pub mod unwind;

pub use allocator::{AllocationStats, Allocator, SystemAllocator, allocation_stats};
pub use array::{ARRAY_HEADER_SIZE, ArrayHeader};
pub use config::{RuntimeConfig, UnwindMode};
pub use dispatch::{ITable, ITableEntry, InterfaceId, MethodPtr, VTable, VTableBuilder};
pub use error::{ConfigError, LayoutError, Trap, trap};
pub use monitor::Monitor;
pub use object::{HEADER_SIZE, OBJECT_ALIGN, ObjectHeader};
pub use reference::Ref;
pub use thread::ManagedThread;
pub use unwind::{ExceptionRecord, catch, throw};
