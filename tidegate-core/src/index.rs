//! Deterministic episode numbering over a torrent's file set.
//!
//! Files are sorted by path with plain byte-wise comparison, then addressed
//! by 1-based position. No locale collation and no natural sort: "file10"
//! sorts before "file2". The ordering is stable for a handle's lifetime
//! because torrent file sets are immutable once metadata is resolved.

use crate::engine::TorrentFileEntry;

/// Errors from resolving an episode index.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("Episode {episode} out of range for torrent with {file_count} files")]
    OutOfRange { episode: i64, file_count: usize },
}

/// Returns the file set in episode order.
pub fn sorted_files(mut files: Vec<TorrentFileEntry>) -> Vec<TorrentFileEntry> {
    files.sort_by(|a, b| a.path.as_bytes().cmp(b.path.as_bytes()));
    files
}

/// Resolves a 1-based episode index against an episode-ordered file set.
///
/// # Errors
///
/// - `IndexError::OutOfRange` - If `episode` is not in `1..=files.len()`;
///   index values arrive from untrusted request input and must never panic
pub fn resolve_episode(
    files: &[TorrentFileEntry],
    episode: i64,
) -> Result<&TorrentFileEntry, IndexError> {
    usize::try_from(episode)
        .ok()
        .filter(|&position| position >= 1 && position <= files.len())
        .map(|position| &files[position - 1])
        .ok_or(IndexError::OutOfRange {
            episode,
            file_count: files.len(),
        })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn entries(paths: &[&str]) -> Vec<TorrentFileEntry> {
        paths
            .iter()
            .enumerate()
            .map(|(file_id, path)| TorrentFileEntry {
                file_id,
                path: (*path).to_string(),
                length: 100,
            })
            .collect()
    }

    #[test]
    fn test_sort_is_byte_wise_not_natural() {
        let sorted = sorted_files(entries(&["file2.mkv", "file10.mkv", "file1.mkv"]));
        let paths: Vec<&str> = sorted.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["file1.mkv", "file10.mkv", "file2.mkv"]);
    }

    #[test]
    fn test_episodes_are_one_based_over_sorted_paths() {
        let sorted = sorted_files(entries(&["b.mkv", "a.mp4"]));

        assert_eq!(resolve_episode(&sorted, 1).unwrap().path, "a.mp4");
        assert_eq!(resolve_episode(&sorted, 2).unwrap().path, "b.mkv");
    }

    #[test]
    fn test_out_of_range_episodes_fail() {
        let sorted = sorted_files(entries(&["a.mp4", "b.mkv"]));

        assert_eq!(
            resolve_episode(&sorted, 0),
            Err(IndexError::OutOfRange {
                episode: 0,
                file_count: 2
            })
        );
        assert_eq!(
            resolve_episode(&sorted, 3),
            Err(IndexError::OutOfRange {
                episode: 3,
                file_count: 2
            })
        );
        assert!(resolve_episode(&sorted, -1).is_err());
        assert!(resolve_episode(&[], 1).is_err());
    }

    #[test]
    fn test_resolution_keeps_engine_file_ids() {
        // Sorting reorders paths but each entry keeps the engine's file id.
        let sorted = sorted_files(entries(&["z.mp4", "a.mp4"]));
        assert_eq!(resolve_episode(&sorted, 1).unwrap().file_id, 1);
        assert_eq!(resolve_episode(&sorted, 2).unwrap().file_id, 0);
    }

    proptest! {
        #[test]
        fn prop_sorted_order_and_bijection(paths in prop::collection::vec("[a-z0-9./]{1,12}", 0..16)) {
            let sorted = sorted_files(entries(
                &paths.iter().map(String::as_str).collect::<Vec<_>>(),
            ));

            for window in sorted.windows(2) {
                prop_assert!(window[0].path.as_bytes() <= window[1].path.as_bytes());
            }

            // Every episode resolves, resolves uniquely, and the extremes fail.
            let mut seen: Vec<usize> = Vec::new();
            for episode in 1..=sorted.len() as i64 {
                let file = resolve_episode(&sorted, episode).unwrap();
                prop_assert!(!seen.contains(&file.file_id));
                seen.push(file.file_id);
            }
            prop_assert_eq!(seen.len(), paths.len());
            prop_assert!(resolve_episode(&sorted, 0).is_err());
            prop_assert!(resolve_episode(&sorted, sorted.len() as i64 + 1).is_err());
        }
    }
}
