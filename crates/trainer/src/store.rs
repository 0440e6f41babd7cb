use std::sync::{Arc, PoisonError, RwLock};

use sprout_domain::{BucketKind, Clip};
use tracing::debug;

/// Immutable view of one bucket. Later mutations never show through.
pub type Snapshot = Arc<Vec<Clip>>;

#[derive(Debug, Default)]
struct Bucket {
    clips: Snapshot,
    revision: u64,
}

impl Bucket {
    fn replace(&mut self, clips: Vec<Clip>) {
        self.clips = Arc::new(clips);
        self.revision += 1;
    }
}

#[derive(Debug, Default)]
struct Buckets {
    good: Bucket,
    bad: Bucket,
}

impl Buckets {
    fn get(&self, kind: BucketKind) -> &Bucket {
        match kind {
            BucketKind::Good => &self.good,
            BucketKind::Bad => &self.bad,
        }
    }

    fn get_mut(&mut self, kind: BucketKind) -> &mut Bucket {
        match kind {
            BucketKind::Good => &mut self.good,
            BucketKind::Bad => &mut self.bad,
        }
    }
}

/// Names of one bucket as rendered, tied to the revision they were read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listing {
    pub bucket: BucketKind,
    pub revision: u64,
    pub names: Vec<String>,
}

/// Shared handle to the good and bad buckets.
///
/// Writers build a new clip vector and swap it in under the write lock, so a
/// [`Snapshot`] is always one whole bucket and `replace_all` is seen by
/// readers as a single step.
#[derive(Clone, Debug, Default)]
pub struct ClipStore {
    inner: Arc<RwLock<Buckets>>,
}

impl ClipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bucket: BucketKind, clip: Clip) -> usize {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let slot = guard.get_mut(bucket);
        let mut clips = slot.clips.as_ref().clone();
        debug!(%bucket, name = clip.name(), "adding clip");
        clips.push(clip);
        let len = clips.len();
        slot.replace(clips);
        len
    }

    /// Out-of-range indices are ignored.
    pub fn remove_at(&self, bucket: BucketKind, index: usize) -> Option<Clip> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let slot = guard.get_mut(bucket);
        if index >= slot.clips.len() {
            debug!(%bucket, index, len = slot.clips.len(), "ignoring out-of-range removal");
            return None;
        }
        let mut clips = slot.clips.as_ref().clone();
        let removed = clips.remove(index);
        slot.replace(clips);
        Some(removed)
    }

    /// Removes the clip at `index` of a listing, unless the bucket has changed
    /// since the listing was taken.
    pub fn remove_listed(&self, listing: &Listing, index: usize) -> Option<Clip> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let slot = guard.get_mut(listing.bucket);
        if slot.revision != listing.revision {
            debug!(
                bucket = %listing.bucket,
                listed = listing.revision,
                current = slot.revision,
                "ignoring removal from a stale listing"
            );
            return None;
        }
        if index >= slot.clips.len() {
            return None;
        }
        let mut clips = slot.clips.as_ref().clone();
        let removed = clips.remove(index);
        slot.replace(clips);
        Some(removed)
    }

    pub fn replace_all(&self, good: Vec<Clip>, bad: Vec<Clip>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        debug!(good = good.len(), bad = bad.len(), "replacing all clips");
        guard.good.replace(good);
        guard.bad.replace(bad);
    }

    pub fn snapshot(&self, bucket: BucketKind) -> Snapshot {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(bucket).clips.clone()
    }

    /// Both buckets read under one lock, as `(good, bad)`.
    pub fn snapshot_all(&self) -> (Snapshot, Snapshot) {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        (guard.good.clips.clone(), guard.bad.clips.clone())
    }

    pub fn listing(&self, bucket: BucketKind) -> Listing {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let slot = guard.get(bucket);
        Listing {
            bucket,
            revision: slot.revision,
            names: slot.clips.iter().map(|clip| clip.name().to_string()).collect(),
        }
    }

    pub fn len(&self, bucket: BucketKind) -> usize {
        self.snapshot(bucket).len()
    }

    pub fn is_empty(&self, bucket: BucketKind) -> bool {
        self.len(bucket) == 0
    }
}
