/*!
 * Tagging boundary.
 *
 * Metadata writing (ID3 and friends) lives outside this crate. The pipeline
 * hands every finished file to a `Tagger` together with its tags.
 */

use anyhow::Result;
use log::debug;
use std::path::Path;

/// Metadata attached to one chapter file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTags {
    /// Chapter title
    pub title: String,
    pub author: String,
    /// Book title
    pub album_title: String,
    /// 1-based chapter number
    pub track_index: usize,
}

/// Writes tags into a finished audio file
pub trait Tagger: Send + Sync {
    fn tag(&self, path: &Path, tags: &AudioTags) -> Result<()>;
}

/// Tagger that only logs what it would write
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTagger;

impl Tagger for NoopTagger {
    fn tag(&self, path: &Path, tags: &AudioTags) -> Result<()> {
        debug!(
            "Tags for {}: track {} '{}' from '{}' by {}",
            path.display(),
            tags.track_index,
            tags.title,
            tags.album_title,
            tags.author
        );
        Ok(())
    }
}
