mod api_token;
mod api_url;
mod hostname;
pub(crate) mod serde_helpers;
mod snapshot_name;
mod storage_name;
mod volume_id;

pub use api_token::ApiToken;
pub use api_url::ApiUrl;
pub use hostname::{Hostname, HostnameConfig};
pub use snapshot_name::SnapshotName;
pub use volume_id::VolumeId;

pub(crate) use storage_name::validate_storage_name;
