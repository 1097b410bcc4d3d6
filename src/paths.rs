//! Relative-reference algebra between storage locations.
//!
//! Documents never embed absolute or backend-specific paths; every
//! reference is stored relative to the referencing document's own
//! directory and resolved back at read time. For every `target` under
//! the same storage root as `base`:
//!
//! `resolve(base, relativize(base, target)) == target`

use std::path::{Component, Path};

use thiserror::Error;

use crate::storage::Location;

/// Failures of the reference algebra.
#[derive(Debug, Error)]
pub enum PathError {
    /// Target cannot be reached from the base by ascent-then-descent
    /// (different backend, different bucket, or a relative local path).
    #[error("reference from `{from}` to `{target}` cannot be expressed relatively")]
    Unrelocatable { from: String, target: String },

    /// A stored reference climbs above the root of its base.
    #[error("relative reference `{reference}` escapes the root of `{base}`")]
    EscapesRoot { base: String, reference: String },
}

/// The realm a location lives in; references never cross realms.
#[derive(Debug, PartialEq, Eq)]
enum Realm<'a> {
    Filesystem,
    Bucket(&'a str),
}

fn realm(location: &Location) -> Realm<'_> {
    match location {
        Location::Local(_) | Location::File(_) => Realm::Filesystem,
        Location::S3 { bucket, .. } => Realm::Bucket(bucket),
    }
}

/// Normalized `/`-separated segments of a location. Local paths must be
/// absolute: a relative base would make the reference depend on the
/// process working directory.
fn segments(location: &Location) -> Result<Vec<String>, ()> {
    match location {
        Location::Local(path) | Location::File(path) => path_segments(path),
        Location::S3 { key, .. } => Ok(key
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()),
    }
}

fn path_segments(path: &Path) -> Result<Vec<String>, ()> {
    if !path.is_absolute() {
        return Err(());
    }
    let mut out = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => match s.to_str() {
                Some(s) => out.push(s.to_string()),
                None => return Err(()),
            },
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if out.pop().is_none() {
                    return Err(());
                }
            }
            Component::Prefix(_) => return Err(()),
        }
    }
    Ok(out)
}

/// Express `target` relative to the directory `from_dir`.
///
/// Produces references like `../media/av1/clip.mp4` or
/// `manifests/a_playlist.json`. Fails rather than ever emitting an
/// absolute path.
pub fn relativize(from_dir: &Location, target: &Location) -> Result<String, PathError> {
    let unrelocatable = || PathError::Unrelocatable {
        from: from_dir.to_string(),
        target: target.to_string(),
    };

    if realm(from_dir) != realm(target) {
        return Err(unrelocatable());
    }

    let from = segments(from_dir).map_err(|_| unrelocatable())?;
    let to = segments(target).map_err(|_| unrelocatable())?;

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = Vec::with_capacity(from.len() - common + to.len() - common);
    for _ in common..from.len() {
        parts.push("..");
    }
    for segment in &to[common..] {
        parts.push(segment.as_str());
    }

    if parts.is_empty() {
        return Ok(".".to_string());
    }
    Ok(parts.join("/"))
}

/// Resolve a stored relative reference against the directory
/// `base_dir`, producing a location of the same classification.
pub fn resolve(base_dir: &Location, reference: &str) -> Result<Location, PathError> {
    let escapes = || PathError::EscapesRoot {
        base: base_dir.to_string(),
        reference: reference.to_string(),
    };

    let mut stack = segments(base_dir).map_err(|_| PathError::Unrelocatable {
        from: base_dir.to_string(),
        target: reference.to_string(),
    })?;

    for segment in reference.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.pop().is_none() {
                    return Err(escapes());
                }
            }
            other => stack.push(other.to_string()),
        }
    }

    let joined = stack.join("/");
    Ok(match base_dir {
        Location::Local(_) => Location::Local(format!("/{joined}").into()),
        Location::File(_) => Location::File(format!("/{joined}").into()),
        Location::S3 { bucket, .. } => Location::S3 {
            bucket: bucket.clone(),
            key: joined,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn local(path: &str) -> Location {
        Location::Local(PathBuf::from(path))
    }

    fn s3(key: &str) -> Location {
        Location::S3 {
            bucket: "vectors".to_string(),
            key: key.to_string(),
        }
    }

    #[test]
    fn descends_into_sibling_tree() {
        let reference = relativize(
            &local("/base/manifests"),
            &local("/base/media/av1/clip.mp4"),
        )
        .unwrap();
        assert_eq!(reference, "../media/av1/clip.mp4");
    }

    #[test]
    fn stays_flat_within_one_directory() {
        let reference = relativize(
            &local("/base/manifests"),
            &local("/base/manifests/a_video_manifest.json"),
        )
        .unwrap();
        assert_eq!(reference, "a_video_manifest.json");
    }

    #[test]
    fn round_trip_law_holds_locally() {
        let base = local("/base/manifests");
        for target in [
            local("/base/media/av1/clip.mp4"),
            local("/base/manifests/x.json"),
            local("/base/playlist_catalog.json"),
            local("/other/tree/file.bin"),
        ] {
            let reference = relativize(&base, &target).unwrap();
            assert_eq!(resolve(&base, &reference).unwrap(), target);
        }
    }

    #[test]
    fn round_trip_law_holds_on_s3() {
        let base = s3("base/manifests");
        for target in [s3("base/media/clip.mp4"), s3("base/manifests/x.json")] {
            let reference = relativize(&base, &target).unwrap();
            assert_eq!(resolve(&base, &reference).unwrap(), target);
        }
    }

    #[test]
    fn crossing_realms_is_unrelocatable() {
        let err = relativize(&local("/base"), &s3("base/media/clip.mp4")).unwrap_err();
        assert!(matches!(err, PathError::Unrelocatable { .. }));

        let other_bucket = Location::S3 {
            bucket: "elsewhere".to_string(),
            key: "media/clip.mp4".to_string(),
        };
        let err = relativize(&s3("base"), &other_bucket).unwrap_err();
        assert!(matches!(err, PathError::Unrelocatable { .. }));
    }

    #[test]
    fn relative_local_base_is_unrelocatable() {
        let err = relativize(&local("base"), &local("/base/file")).unwrap_err();
        assert!(matches!(err, PathError::Unrelocatable { .. }));
    }

    #[test]
    fn over_ascent_escapes_root() {
        let err = resolve(&s3("manifests"), "../../../clip.mp4").unwrap_err();
        assert!(matches!(err, PathError::EscapesRoot { .. }));
    }

    #[test]
    fn resolve_preserves_classification() {
        let base = Location::File(PathBuf::from("/srv/vectors/manifests"));
        let resolved = resolve(&base, "../media/clip.mp4").unwrap();
        assert_eq!(
            resolved,
            Location::File(PathBuf::from("/srv/vectors/media/clip.mp4"))
        );
    }
}
