use crate::backend::BackendObject;
use crate::descriptor::DescriptorIndex;

/// An object whose handle is gone but whose GPU memory may still be in use.
#[derive(Debug, Clone)]
pub(crate) struct Retired {
    pub fence: u64,
    pub object: BackendObject,
    pub descriptor: Option<DescriptorIndex>,
}

/// Objects awaiting release, keyed by the completion marker after which the
/// GPU can no longer reference them.
#[derive(Debug, Default)]
pub(crate) struct RetirementQueue {
    entries: Vec<Retired>,
}

impl RetirementQueue {
    pub fn push(&mut self, fence: u64, object: BackendObject, descriptor: Option<DescriptorIndex>) {
        log::debug!("retiring {object:?} after marker {fence}");
        self.entries.push(Retired {
            fence,
            object,
            descriptor,
        });
    }

    /// Removes and returns every entry whose marker is `<= completed`.
    pub fn drain_completed(&mut self, completed: u64) -> Vec<Retired> {
        let (done, waiting): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|r| r.fence <= completed);
        self.entries = waiting;
        done
    }

    pub fn drain_all(&mut self) -> Vec<Retired> {
        std::mem::take(&mut self.entries)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
