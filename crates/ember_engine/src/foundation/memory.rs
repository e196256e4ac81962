//! Memory utilities: a linear bump allocator and tagged allocation telemetry

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

/// Block alignment for allocator backing storage.
const BLOCK_ALIGN: usize = 16;

/// Linear (bump) allocator over a single owned block
///
/// Allocations are handed out front to back with no per-allocation free;
/// the only way to reclaim space is [`LinearAllocator::free_all`], which
/// resets the whole arena. Suited to per-frame scratch data that is thrown
/// away wholesale.
pub struct LinearAllocator {
    memory: NonNull<u8>,
    layout: Layout,
    total_size: usize,
    allocated: usize,
}

impl LinearAllocator {
    /// Create an allocator owning a zero-initialized block of `total_size` bytes.
    ///
    /// # Panics
    /// Panics if `total_size` is zero or rounds to an invalid layout.
    pub fn new(total_size: usize) -> Self {
        assert!(total_size > 0, "linear allocator requires a non-zero size");
        let layout = Layout::from_size_align(total_size, BLOCK_ALIGN)
            .unwrap_or_else(|_| panic!("invalid allocation size: {total_size}"));
        let raw = unsafe { alloc_zeroed(layout) };
        let memory = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        };

        Self {
            memory,
            layout,
            total_size,
            allocated: 0,
        }
    }

    /// Allocate `size` bytes from the front of the arena.
    ///
    /// Returns `None` when the arena cannot satisfy the request; the arena
    /// state is left unchanged in that case.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if self.allocated + size > self.total_size {
            let remaining = self.total_size - self.allocated;
            log::error!(
                "Linear allocator out of space, requested {} bytes, {} remaining",
                size,
                remaining
            );
            return None;
        }

        // Offsets stay within the block, so the add cannot leave it.
        let ptr = unsafe { NonNull::new_unchecked(self.memory.as_ptr().add(self.allocated)) };
        self.allocated += size;
        Some(ptr)
    }

    /// Release every allocation at once and zero the block.
    pub fn free_all(&mut self) {
        self.allocated = 0;
        unsafe {
            std::ptr::write_bytes(self.memory.as_ptr(), 0, self.total_size);
        }
    }

    /// Total capacity of the arena in bytes.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Bytes currently handed out.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.total_size - self.allocated
    }
}

impl Drop for LinearAllocator {
    fn drop(&mut self) {
        unsafe {
            dealloc(self.memory.as_ptr(), self.layout);
        }
    }
}

// The arena owns its block exclusively; the raw pointer never escapes a
// thread boundary on its own.
unsafe impl Send for LinearAllocator {}

/// Category an allocation is attributed to in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTag {
    /// Untagged allocation. Tracked, but flagged so it gets re-classed.
    Unknown,
    /// Linear allocator backing blocks.
    LinearAllocator,
    /// Growable arrays and similar containers.
    Array,
    /// String storage.
    String,
    /// Application driver state.
    Application,
    /// Event bus state.
    Event,
    /// Input tracker state.
    Input,
    /// Renderer frontend and backend state.
    Renderer,
    /// Application-defined allocations.
    Game,
}

/// Number of [`MemoryTag`] variants.
pub const MEMORY_TAG_COUNT: usize = 9;

impl MemoryTag {
    fn index(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            MemoryTag::Unknown => "UNKNOWN",
            MemoryTag::LinearAllocator => "LINEAR_ALLOC",
            MemoryTag::Array => "ARRAY",
            MemoryTag::String => "STRING",
            MemoryTag::Application => "APPLICATION",
            MemoryTag::Event => "EVENT",
            MemoryTag::Input => "INPUT",
            MemoryTag::Renderer => "RENDERER",
            MemoryTag::Game => "GAME",
        }
    }

    fn all() -> [MemoryTag; MEMORY_TAG_COUNT] {
        [
            MemoryTag::Unknown,
            MemoryTag::LinearAllocator,
            MemoryTag::Array,
            MemoryTag::String,
            MemoryTag::Application,
            MemoryTag::Event,
            MemoryTag::Input,
            MemoryTag::Renderer,
            MemoryTag::Game,
        ]
    }
}

/// Per-tag allocation tallies
///
/// Subsystems report their footprint here at bring-up so memory stays
/// attributable even though each subsystem owns its allocations directly.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    total_allocated: u64,
    tagged: [u64; MEMORY_TAG_COUNT],
    alloc_count: u64,
}

impl MemoryTracker {
    /// Create a tracker with all tallies at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an allocation of `size` bytes under `tag`.
    pub fn track_alloc(&mut self, tag: MemoryTag, size: u64) {
        if tag == MemoryTag::Unknown {
            log::warn!("Allocation of {} bytes tracked as UNKNOWN, re-class it", size);
        }
        self.total_allocated += size;
        self.tagged[tag.index()] += size;
        self.alloc_count += 1;
    }

    /// Record that `size` bytes under `tag` were released.
    pub fn track_free(&mut self, tag: MemoryTag, size: u64) {
        self.total_allocated = self.total_allocated.saturating_sub(size);
        self.tagged[tag.index()] = self.tagged[tag.index()].saturating_sub(size);
    }

    /// Total bytes currently attributed across all tags.
    pub fn total_allocated(&self) -> u64 {
        self.total_allocated
    }

    /// Bytes currently attributed to `tag`.
    pub fn tagged_allocated(&self, tag: MemoryTag) -> u64 {
        self.tagged[tag.index()]
    }

    /// Number of allocations recorded over the tracker's lifetime.
    pub fn alloc_count(&self) -> u64 {
        self.alloc_count
    }

    /// Render the tallies as a human-readable multi-line report.
    pub fn usage_report(&self) -> String {
        const GIB: u64 = 1024 * 1024 * 1024;
        const MIB: u64 = 1024 * 1024;
        const KIB: u64 = 1024;

        let mut report = String::from("System memory use (tagged):\n");
        for tag in MemoryTag::all() {
            let bytes = self.tagged[tag.index()];
            let (amount, unit) = if bytes >= GIB {
                (bytes as f64 / GIB as f64, "GiB")
            } else if bytes >= MIB {
                (bytes as f64 / MIB as f64, "MiB")
            } else if bytes >= KIB {
                (bytes as f64 / KIB as f64, "KiB")
            } else {
                (bytes as f64, "B")
            };
            report.push_str(&format!("  {:<12}: {:.2} {}\n", tag.name(), amount, unit));
        }
        report.push_str(&format!("  total allocations: {}", self.alloc_count));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_reports_empty_arena() {
        let allocator = LinearAllocator::new(1024);
        assert_eq!(allocator.total_size(), 1024);
        assert_eq!(allocator.allocated(), 0);
        assert_eq!(allocator.remaining(), 1024);
    }

    #[test]
    fn single_allocation_can_fill_arena() {
        let mut allocator = LinearAllocator::new(512);
        let block = allocator.allocate(512);
        assert!(block.is_some());
        assert_eq!(allocator.allocated(), 512);
        assert_eq!(allocator.remaining(), 0);
    }

    #[test]
    fn allocations_are_contiguous_and_increasing() {
        let mut allocator = LinearAllocator::new(1024);
        let mut previous: Option<usize> = None;
        for _ in 0..3 {
            let ptr = allocator.allocate(8).map(|p| p.as_ptr() as usize);
            let addr = ptr.unwrap();
            if let Some(prev) = previous {
                assert_eq!(addr, prev + 8);
            }
            previous = Some(addr);
        }
        assert_eq!(allocator.allocated(), 24);
    }

    #[test]
    fn over_allocation_fails_and_leaves_state_unchanged() {
        let mut allocator = LinearAllocator::new(64);
        assert!(allocator.allocate(48).is_some());
        assert!(allocator.allocate(32).is_none());
        assert_eq!(allocator.allocated(), 48);
        assert!(allocator.allocate(16).is_some());
        assert_eq!(allocator.allocated(), 64);
    }

    #[test]
    fn free_all_resets_and_zeroes() {
        let mut allocator = LinearAllocator::new(128);
        let ptr = allocator.allocate(128).unwrap();
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0xAB, 128);
        }
        allocator.free_all();
        assert_eq!(allocator.allocated(), 0);
        let reused = allocator.allocate(128).unwrap();
        assert_eq!(reused.as_ptr() as usize, ptr.as_ptr() as usize);
        let first = unsafe { *reused.as_ptr() };
        assert_eq!(first, 0);
    }

    #[test]
    fn tracker_attributes_by_tag() {
        let mut tracker = MemoryTracker::new();
        tracker.track_alloc(MemoryTag::Renderer, 4096);
        tracker.track_alloc(MemoryTag::Event, 256);
        tracker.track_alloc(MemoryTag::Renderer, 1024);

        assert_eq!(tracker.total_allocated(), 5376);
        assert_eq!(tracker.tagged_allocated(MemoryTag::Renderer), 5120);
        assert_eq!(tracker.tagged_allocated(MemoryTag::Event), 256);
        assert_eq!(tracker.alloc_count(), 3);

        tracker.track_free(MemoryTag::Renderer, 1024);
        assert_eq!(tracker.tagged_allocated(MemoryTag::Renderer), 4096);
        assert_eq!(tracker.total_allocated(), 4352);
    }

    #[test]
    fn usage_report_names_every_tag() {
        let mut tracker = MemoryTracker::new();
        tracker.track_alloc(MemoryTag::Input, 2 * 1024 * 1024);
        let report = tracker.usage_report();
        assert!(report.contains("INPUT"));
        assert!(report.contains("2.00 MiB"));
        assert!(report.contains("RENDERER"));
        assert!(report.contains("total allocations: 1"));
    }
}
