//! Shared-memory block abstraction.
//!
//! A blob above the inline threshold travels in an externally allocated
//! region reachable through a transferable handle: `memfd` segments on Unix,
//! and an in-process simulated segment for tests and other platforms. The
//! region is released exactly once when the last handle or view drops.

use std::sync::Arc;

use crate::error::Result;

/// Allocates shared-memory blocks for outbound blobs.
pub trait ShmemBackend: Send + Sync {
    fn allocate(&self, size: usize) -> Result<ShmemHandle>;
}

/// A transferable reference to one shared-memory block.
#[derive(Debug)]
pub enum ShmemHandle {
    #[cfg(unix)]
    Memfd(memfd::MemfdRegion),
    Heap(HeapSegment),
}

impl ShmemHandle {
    /// Actual size of the underlying region.
    pub fn size(&self) -> usize {
        match self {
            #[cfg(unix)]
            ShmemHandle::Memfd(region) => region.size(),
            ShmemHandle::Heap(segment) => segment.size(),
        }
    }

    /// Fill the region. Only valid before the handle is attached and sent.
    ///
    /// Fails when `data` is larger than the allocated region.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.size() {
            return Err(crate::error::ShmemError::RegionTooSmall {
                declared: data.len(),
                actual: self.size(),
            });
        }
        match self {
            #[cfg(unix)]
            ShmemHandle::Memfd(region) => region.write_all(data),
            ShmemHandle::Heap(segment) => segment.write_all(data),
        }
    }

    /// Map the region read-only.
    pub fn map_for_read(&self) -> Result<ShmemView> {
        match self {
            #[cfg(unix)]
            ShmemHandle::Memfd(region) => region.map_for_read(),
            ShmemHandle::Heap(segment) => Ok(ShmemView::Heap(segment.snapshot())),
        }
    }
}

/// A read-only mapping of a shared-memory block.
#[derive(Debug)]
pub enum ShmemView {
    #[cfg(unix)]
    Mapped(memfd::MappedView),
    Heap(Arc<Vec<u8>>),
}

impl ShmemView {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            #[cfg(unix)]
            ShmemView::Mapped(view) => view.as_slice(),
            ShmemView::Heap(data) => data,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process simulated shared-memory segment.
///
/// Backs tests and non-Unix builds: the "region" is a refcounted buffer, so
/// transfer is an `Arc` move and release-exactly-once falls out of the last
/// clone dropping.
#[derive(Debug, Clone)]
pub struct HeapSegment {
    data: Arc<Vec<u8>>,
}

impl HeapSegment {
    fn new(size: usize) -> Self {
        Self {
            data: Arc::new(vec![0u8; size]),
        }
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let region = Arc::get_mut(&mut self.data).ok_or_else(|| {
            std::io::Error::other("heap segment already shared, cannot write")
        })?;
        region[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn snapshot(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.data)
    }
}

/// Backend producing in-process simulated segments.
#[derive(Debug, Default)]
pub struct HeapBackend;

impl ShmemBackend for HeapBackend {
    fn allocate(&self, size: usize) -> Result<ShmemHandle> {
        Ok(ShmemHandle::Heap(HeapSegment::new(size)))
    }
}

/// Backend producing anonymous `memfd` segments (Unix).
#[cfg(unix)]
#[derive(Debug, Default)]
pub struct MemfdBackend;

#[cfg(unix)]
impl ShmemBackend for MemfdBackend {
    fn allocate(&self, size: usize) -> Result<ShmemHandle> {
        Ok(ShmemHandle::Memfd(memfd::MemfdRegion::create(size)?))
    }
}

/// The platform-preferred backend.
pub fn default_backend() -> Arc<dyn ShmemBackend> {
    #[cfg(unix)]
    {
        Arc::new(MemfdBackend)
    }
    #[cfg(not(unix))]
    {
        Arc::new(HeapBackend)
    }
}

#[cfg(unix)]
pub mod memfd {
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    use crate::error::Result;

    /// An anonymous shared-memory region backed by a `memfd` descriptor.
    ///
    /// The descriptor is closed when the region drops; mappings hold no
    /// reference to the descriptor and are unmapped independently.
    #[derive(Debug)]
    pub struct MemfdRegion {
        fd: OwnedFd,
        size: usize,
    }

    impl MemfdRegion {
        pub(crate) fn create(size: usize) -> Result<Self> {
            let name = c"renderwire-blob";
            // SAFETY: `name` is a valid NUL-terminated string for the call.
            let fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
            if fd < 0 {
                return Err(std::io::Error::last_os_error().into());
            }
            // SAFETY: `fd` is a freshly created descriptor we own.
            let fd = unsafe { OwnedFd::from_raw_fd(fd) };
            // SAFETY: `fd` is open; resizing an unmapped memfd is well-defined.
            let rc = unsafe { libc::ftruncate(fd.as_raw_fd(), size as libc::off_t) };
            if rc != 0 {
                return Err(std::io::Error::last_os_error().into());
            }
            Ok(Self { fd, size })
        }

        pub fn size(&self) -> usize {
            self.size
        }

        pub(crate) fn write_all(&mut self, data: &[u8]) -> Result<()> {
            let view =
                Mapping::map(self.fd.as_raw_fd(), self.size, libc::PROT_READ | libc::PROT_WRITE)?;
            // SAFETY: the mapping spans `size` bytes and is writable; `data`
            // never exceeds the allocation made for it.
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), view.ptr.cast::<u8>(), data.len());
            }
            Ok(())
        }

        pub(crate) fn map_for_read(&self) -> Result<super::ShmemView> {
            let mapping = Mapping::map(self.fd.as_raw_fd(), self.size, libc::PROT_READ)?;
            Ok(super::ShmemView::Mapped(MappedView { mapping }))
        }
    }

    #[derive(Debug)]
    struct Mapping {
        ptr: *mut libc::c_void,
        len: usize,
    }

    // SAFETY: the mapping is private to its owner and the pointed-to region
    // lives until munmap in Drop.
    unsafe impl Send for Mapping {}
    unsafe impl Sync for Mapping {}

    impl Mapping {
        fn map(fd: libc::c_int, len: usize, prot: libc::c_int) -> Result<Self> {
            if len == 0 {
                return Ok(Self {
                    ptr: std::ptr::null_mut(),
                    len: 0,
                });
            }
            // SAFETY: fd is an open memfd of at least `len` bytes.
            let ptr = unsafe {
                libc::mmap(std::ptr::null_mut(), len, prot, libc::MAP_SHARED, fd, 0)
            };
            if ptr == libc::MAP_FAILED {
                return Err(std::io::Error::last_os_error().into());
            }
            Ok(Self { ptr, len })
        }
    }

    impl Drop for Mapping {
        fn drop(&mut self) {
            if !self.ptr.is_null() {
                // SAFETY: ptr/len came from a successful mmap above.
                unsafe {
                    libc::munmap(self.ptr, self.len);
                }
            }
        }
    }

    /// A read-only view over a mapped `memfd` region.
    #[derive(Debug)]
    pub struct MappedView {
        mapping: Mapping,
    }

    impl MappedView {
        pub fn as_slice(&self) -> &[u8] {
            if self.mapping.len == 0 {
                return &[];
            }
            // SAFETY: the mapping is valid for `len` bytes until Drop.
            unsafe {
                std::slice::from_raw_parts(self.mapping.ptr.cast::<u8>(), self.mapping.len)
            }
        }
    }
}
