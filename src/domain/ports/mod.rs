mod connectivity_port;
mod image_source_port;
mod remote_record_port;
mod thumbnail_cache_port;

pub use connectivity_port::ConnectivityProbe;
pub use image_source_port::{FetchedImage, ImageSourcePort};
pub use remote_record_port::{BlobRef, RemoteRecordPort};
pub use thumbnail_cache_port::ThumbnailCachePort;

#[cfg(test)]
pub mod mocks {
    pub use super::image_source_port::MockImageSourcePort;
    pub use super::remote_record_port::mock::RecordingRemote;
}
