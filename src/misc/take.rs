use std::ops::{Deref, DerefMut};

pub struct Take<T>(Option<T>);

/// more convenient replacement for when you need to use Option::take once, at the end of a values life
impl<T> Take<T> {
    pub fn new(val: T) -> Self {
        Self(Some(val))
    }

    /// # Panics
    /// - if the value was already taken
    pub fn take(&mut self) -> T {
        self.0.take().expect("Take::take called twice")
    }

    pub fn is_taken(&self) -> bool {
        self.0.is_none()
    }
}

impl<T> Deref for Take<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref().expect("use of Take after its value was taken")
    }
}

impl<T> DerefMut for Take<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut().expect("use of Take after its value was taken")
    }
}
