//! # Utility module

/// Reinterpret an optional reference slot as an out-pointer.
///
/// C APIs often allocate an object and write its address through a `T **` argument. This trait
/// lets `Option<&mut T>` be passed there directly, and be `Some` afterwards if the call
/// succeeded.
pub trait AsMutPtr {
    type Mut;

    fn as_mut_ptr(&mut self) -> &mut *mut Self::Mut;
}

impl<T: AsMutPtr> AsMutPtr for Option<T> {
    type Mut = T::Mut;

    fn as_mut_ptr(&mut self) -> &mut *mut Self::Mut {
        // SAFETY: `Option<&mut T>` has the same layout as a nullable `*mut T`.
        unsafe { std::mem::transmute(self) }
    }
}

impl<T> AsMutPtr for &mut T {
    type Mut = T;

    fn as_mut_ptr(&mut self) -> &mut *mut Self::Mut {
        unsafe { std::mem::transmute(self) }
    }
}

impl<T: AsMutPtr> AsMutPtr for *mut T {
    type Mut = T::Mut;

    fn as_mut_ptr(&mut self) -> &mut *mut Self::Mut {
        unsafe { std::mem::transmute(self) }
    }
}

/// Reinterpret an optional shared reference slot as a const out-pointer.
pub trait AsConstPtr {
    type Target;

    fn as_const_ptr(&mut self) -> &mut *const Self::Target;
}

impl<T> AsConstPtr for Option<&T> {
    type Target = T;

    fn as_const_ptr(&mut self) -> &mut *const T {
        // SAFETY: `Option<&T>` has the same layout as a nullable `*const T`.
        unsafe { std::mem::transmute(self) }
    }
}
