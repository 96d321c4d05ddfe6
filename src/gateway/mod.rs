pub mod requests;
pub mod service;

pub use requests::{
    CancelImportResponse, ConfigDbRequest, ConfigDbResponse, ErrorPayload, ImportDbRequest,
    ImportDbResponse, ImportResultResponse, JobStatusResponse,
};
pub use service::RequestGateway;
