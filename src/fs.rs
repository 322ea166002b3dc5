//! File timestamps and the freshness rule built on them.

use std::time::SystemTime;

/// MTime info gathered for a file.  This also models "file is absent".
/// It's not using an Option<> just because it makes the code using it easier
/// to follow.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MTime {
    Missing,
    Stamp(SystemTime),
}

/// stat() an on-disk path, producing its MTime.
pub fn stat(path: &str) -> std::io::Result<MTime> {
    Ok(match std::fs::metadata(path) {
        Ok(meta) => MTime::Stamp(meta.modified()?),
        Err(err) => {
            if err.kind() == std::io::ErrorKind::NotFound {
                MTime::Missing
            } else {
                return Err(err);
            }
        }
    })
}

/// Whether a target must be rebuilt given the state of its prerequisites:
/// it's stale if it's missing, if any prerequisite is missing, or if any
/// prerequisite is strictly newer than it.
pub fn is_stale<I: IntoIterator<Item = MTime>>(target: MTime, prereqs: I) -> bool {
    let target = match target {
        MTime::Missing => return true,
        MTime::Stamp(t) => t,
    };
    prereqs.into_iter().any(|prereq| match prereq {
        MTime::Missing => true,
        MTime::Stamp(t) => t > target,
    })
}
