pub mod analysis;
pub mod repository;
pub mod upload;

pub use analysis::{content_key, AnalysisOutcome, AnalysisService};
pub use repository::{DocumentRepository, DocumentService, MemoryDocumentRepository, NewDocument};
pub use upload::{
    DocumentUploadHandler, FallbackUploadHandler, FilePart, UploadHandler, UploadRequest,
};

pub use ds_error::{DsError, Result};
