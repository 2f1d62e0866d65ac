pub mod instance_dir;

pub use instance_dir::{resolve_instance_dir, InstanceDirError, DEFAULT_INSTANCE_SUBDIR};
