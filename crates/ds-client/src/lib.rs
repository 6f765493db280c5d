pub mod coordinator;
pub mod notice;
pub mod source;
pub mod store;

pub use coordinator::{Submission, UploadCoordinator, UPLOAD_ERROR_PREFIX};
pub use notice::{Notice, NoticeBoard, NOTICE_LIFETIME};
pub use source::{DriveFileSource, FileSource, LocalFileSource, DEFAULT_DRIVE_API};
pub use store::{ClientStore, ORIGINAL_TEXT_KEY, USER_ID_KEY};

pub use ds_error::{DsError, Result};
