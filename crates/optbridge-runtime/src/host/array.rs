//! Host numeric arrays
//!
//! An [`NdArray`] is a 1-D or row-major 2-D array of `f64`. Its storage is one of:
//! - owned: a [`SharedVector`] the host and native code may both hold
//! - pinned: a read-only slice inside an immutable native object kept alive by the array
//! - view: a window over a native buffer that is only valid inside a [`ViewScope`]
//!
//! All access goes through closures so that borrows never outlive the storage.

use super::exception::HostException;
use optbridge_engine::SharedVector;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// Array dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Vector(usize),
    Matrix(usize, usize),
}

impl Shape {
    pub fn len(self) -> usize {
        match self {
            Shape::Vector(n) => n,
            Shape::Matrix(rows, cols) => rows * cols,
        }
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    pub fn ndim(self) -> usize {
        match self {
            Shape::Vector(_) => 1,
            Shape::Matrix(..) => 2,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Vector(n) => write!(f, "({},)", n),
            Shape::Matrix(rows, cols) => write!(f, "({}, {})", rows, cols),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Vector,
    Matrix { cols: usize },
}

struct PinnedBuffer {
    _owner: Rc<dyn Any>,
    ptr: *const f64,
    len: usize,
}

struct ViewBuffer {
    ptr: *mut f64,
    len: usize,
    writable: bool,
    live: Cell<bool>,
    access: RefCell<()>,
}

#[derive(Clone)]
enum Storage {
    Owned(SharedVector),
    Pinned(Rc<PinnedBuffer>),
    View(Rc<ViewBuffer>),
}

#[derive(Clone)]
pub struct NdArray {
    storage: Storage,
    layout: Layout,
}

fn expired() -> HostException {
    HostException::runtime_error("array view is no longer valid")
}

fn in_use() -> HostException {
    HostException::runtime_error("array is already in use")
}

fn read_only() -> HostException {
    HostException::value_error("assignment destination is read-only")
}

impl NdArray {
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self::from_shared(Rc::new(RefCell::new(data)))
    }

    /// Wrap a shared vector without copying
    pub fn from_shared(data: SharedVector) -> Self {
        Self {
            storage: Storage::Owned(data),
            layout: Layout::Vector,
        }
    }

    pub fn zeros(shape: Shape) -> Self {
        let mut array = Self::from_vec(vec![0.0; shape.len()]);
        if let Shape::Matrix(_, cols) = shape {
            array.layout = Layout::Matrix { cols };
        }
        array
    }

    /// Row-major `rows x cols` matrix
    pub fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, HostException> {
        if data.len() != rows * cols {
            return Err(HostException::value_error(format!(
                "cannot reshape array of size {} into shape ({}, {})",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self {
            storage: Storage::Owned(Rc::new(RefCell::new(data))),
            layout: Layout::Matrix { cols },
        })
    }

    /// Read-only 1-D array over a slice of `owner`. The array keeps `owner` alive.
    pub fn pinned<T: 'static>(owner: Rc<T>, project: impl for<'a> Fn(&'a T) -> &'a [f64]) -> Self {
        let (ptr, len) = {
            let slice = project(&owner);
            (slice.as_ptr(), slice.len())
        };
        Self {
            storage: Storage::Pinned(Rc::new(PinnedBuffer {
                _owner: owner,
                ptr,
                len,
            })),
            layout: Layout::Vector,
        }
    }

    pub fn shape(&self) -> Result<Shape, HostException> {
        let len = self.len()?;
        Ok(match self.layout {
            Layout::Vector => Shape::Vector(len),
            Layout::Matrix { cols } if cols == 0 => Shape::Matrix(0, 0),
            Layout::Matrix { cols } => Shape::Matrix(len / cols, cols),
        })
    }

    pub fn len(&self) -> Result<usize, HostException> {
        match &self.storage {
            Storage::Owned(data) => data.try_borrow().map(|v| v.len()).map_err(|_| in_use()),
            Storage::Pinned(buffer) => Ok(buffer.len),
            Storage::View(view) => {
                if !view.live.get() {
                    return Err(expired());
                }
                Ok(view.len)
            }
        }
    }

    pub fn is_writable(&self) -> bool {
        match &self.storage {
            Storage::Owned(_) => true,
            Storage::Pinned(_) => false,
            Storage::View(view) => view.writable && view.live.get(),
        }
    }

    /// The shared vector behind an owned 1-D array
    pub fn shared_vector(&self) -> Option<SharedVector> {
        match (&self.storage, self.layout) {
            (Storage::Owned(data), Layout::Vector) => Some(Rc::clone(data)),
            _ => None,
        }
    }

    /// Address of the first element, for identity checks only
    pub fn data_ptr(&self) -> Result<*const f64, HostException> {
        match &self.storage {
            Storage::Owned(data) => data
                .try_borrow()
                .map(|v| v.as_ptr())
                .map_err(|_| in_use()),
            Storage::Pinned(buffer) => Ok(buffer.ptr),
            Storage::View(view) => {
                if !view.live.get() {
                    return Err(expired());
                }
                Ok(view.ptr as *const f64)
            }
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&[f64]) -> R) -> Result<R, HostException> {
        match &self.storage {
            Storage::Owned(data) => {
                let data = data.try_borrow().map_err(|_| in_use())?;
                Ok(f(&data))
            }
            // SAFETY: the owner is immutable and kept alive by this buffer.
            Storage::Pinned(buffer) => {
                Ok(f(unsafe { std::slice::from_raw_parts(buffer.ptr, buffer.len) }))
            }
            Storage::View(view) => {
                if !view.live.get() {
                    return Err(expired());
                }
                let _guard = view.access.try_borrow().map_err(|_| in_use())?;
                // SAFETY: the view is live, so the scope that lent the buffer
                // has not ended, and no mutable access is active.
                Ok(f(unsafe { std::slice::from_raw_parts(view.ptr, view.len) }))
            }
        }
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut [f64]) -> R) -> Result<R, HostException> {
        match &self.storage {
            Storage::Owned(data) => {
                let mut data = data.try_borrow_mut().map_err(|_| in_use())?;
                Ok(f(&mut data))
            }
            Storage::Pinned(_) => Err(read_only()),
            Storage::View(view) => {
                if !view.live.get() {
                    return Err(expired());
                }
                if !view.writable {
                    return Err(read_only());
                }
                let _guard = view.access.try_borrow_mut().map_err(|_| in_use())?;
                // SAFETY: live and writable views come from a `&mut` buffer lent
                // for the scope; the access guard excludes every other borrow.
                Ok(f(unsafe { std::slice::from_raw_parts_mut(view.ptr, view.len) }))
            }
        }
    }

    pub fn to_vec(&self) -> Result<Vec<f64>, HostException> {
        self.read(<[f64]>::to_vec)
    }

    pub fn get(&self, index: usize) -> Result<f64, HostException> {
        self.read(|data| data.get(index).copied())?
            .ok_or_else(|| out_of_bounds(index))
    }

    pub fn set(&self, index: usize, value: f64) -> Result<(), HostException> {
        self.write(|data| match data.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(out_of_bounds(index)),
        })?
    }

    /// Element `(row, col)` of a matrix
    pub fn get2(&self, row: usize, col: usize) -> Result<f64, HostException> {
        let index = self.flat_index(row, col)?;
        self.get(index)
    }

    pub fn set2(&self, row: usize, col: usize, value: f64) -> Result<(), HostException> {
        let index = self.flat_index(row, col)?;
        self.set(index, value)
    }

    fn flat_index(&self, row: usize, col: usize) -> Result<usize, HostException> {
        match self.shape()? {
            Shape::Matrix(rows, cols) if row < rows && col < cols => Ok(row * cols + col),
            Shape::Matrix(..) => Err(HostException::new(
                "IndexError",
                format!("index ({}, {}) is out of bounds", row, col),
            )),
            Shape::Vector(_) => Err(HostException::new(
                "IndexError",
                "too many indices for array: array is 1-dimensional",
            )),
        }
    }

    /// True when both arrays read the same memory
    pub fn same_buffer(&self, other: &NdArray) -> bool {
        match (&self.storage, &other.storage) {
            (Storage::Owned(a), Storage::Owned(b)) => Rc::ptr_eq(a, b),
            (Storage::Pinned(a), Storage::Pinned(b)) => a.ptr == b.ptr,
            (Storage::View(a), Storage::View(b)) => a.ptr == b.ptr,
            _ => false,
        }
    }
}

fn out_of_bounds(index: usize) -> HostException {
    HostException::new("IndexError", format!("index {} is out of bounds", index))
}

impl fmt::Debug for NdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_vec() {
            Ok(data) => write!(f, "array({:?})", data),
            Err(_) => write!(f, "array(<unavailable>)"),
        }
    }
}

/// Lends native buffers to host code as [`NdArray`] views
///
/// Every view created through the scope is invalidated when the scope ends,
/// on every exit path. Host code that kept a view gets an error on access.
pub struct ViewScope<'a> {
    views: Vec<Rc<ViewBuffer>>,
    _buffers: PhantomData<&'a mut [f64]>,
}

impl<'a> ViewScope<'a> {
    /// Run `f` with a fresh scope; views die when `f` returns
    ///
    /// Mutable buffers must be moved into `f` (`let out = out;`), not
    /// reborrowed from a capture.
    pub fn scoped<R>(f: impl FnOnce(&mut ViewScope<'a>) -> R) -> R {
        let mut scope = ViewScope {
            views: Vec::new(),
            _buffers: PhantomData,
        };
        f(&mut scope)
    }

    /// Writable view over `buffer`
    pub fn writable(&mut self, buffer: &'a mut [f64], shape: Shape) -> NdArray {
        self.lend(buffer.as_mut_ptr(), buffer.len(), true, shape)
    }

    /// Read-only view over `buffer`
    pub fn read_only(&mut self, buffer: &'a [f64], shape: Shape) -> NdArray {
        self.lend(buffer.as_ptr() as *mut f64, buffer.len(), false, shape)
    }

    fn lend(&mut self, ptr: *mut f64, len: usize, writable: bool, shape: Shape) -> NdArray {
        debug_assert_eq!(shape.len(), len);
        let view = Rc::new(ViewBuffer {
            ptr,
            len,
            writable,
            live: Cell::new(true),
            access: RefCell::new(()),
        });
        self.views.push(Rc::clone(&view));
        NdArray {
            storage: Storage::View(view),
            layout: match shape {
                Shape::Vector(_) => Layout::Vector,
                Shape::Matrix(_, cols) => Layout::Matrix { cols },
            },
        }
    }
}

impl Drop for ViewScope<'_> {
    fn drop(&mut self) {
        for view in &self.views {
            view.live.set(false);
        }
    }
}
