//! Sample gallery
//!
//! Read-only showcase of example portraits. Has no effect on workflow state.

use crate::image_loader::ImageHandle;

/// Number of samples shown in the gallery
pub const SAMPLE_COUNT: usize = 6;

const SAMPLE_SIZE: u32 = 100;

/// Sample handles supplied by the asset host, in display order
pub fn sample_gallery() -> Vec<ImageHandle> {
    (1..=SAMPLE_COUNT)
        .map(|i| {
            ImageHandle::from_uri(
                format!(
                    "/placeholder.svg?height={0}&width={0}&text=Sample+{1}",
                    SAMPLE_SIZE, i
                ),
                SAMPLE_SIZE,
                SAMPLE_SIZE,
            )
        })
        .collect()
}
