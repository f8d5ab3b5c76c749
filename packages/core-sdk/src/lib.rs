pub mod composer;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod server;
pub mod telemetry;
pub mod transport;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块。
 */
pub mod prelude {
    pub use crate::composer;
    pub use crate::config::{FallbackMode, InstructorConfig};
    pub use crate::db;
    pub use crate::error::{ChatError, ErrorKind};
    pub use crate::llm::Instructor;
    pub use crate::models::{ChatResult, ModelCandidates};
    pub use crate::server;
    pub use crate::telemetry;
    pub use crate::transport::{HttpTransport, Transport};
}
