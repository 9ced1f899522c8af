use utoipa::OpenApi;

use crate::modules::job::dto::{JobResponse, ProcessAccepted, ServiceInfo};
use crate::modules::job::model::JobStatus;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::job::handler::root,
        crate::modules::job::handler::upload_video,
        crate::modules::job::handler::process_video,
        crate::modules::job::handler::get_status,
        crate::modules::job::handler::list_videos,
        crate::modules::job::download_handler::download_video,
    ),
    components(
        schemas(
            JobResponse,
            JobStatus,
            ProcessAccepted,
            ServiceInfo,
        )
    ),
    tags(
        (name = "Videos", description = "Upload, upscale to 1080p and download")
    )
)]
pub struct ApiDoc;
