use std::any::{Any, TypeId};

/// A cached value with its type erased, remembering what it was stored as
#[derive(Debug)]
pub(crate) struct AnyValue {
    pub(crate) type_id: TypeId,
    pub(crate) value: Box<dyn Any + Send + Sync>,
}

impl AnyValue {
    pub(crate) fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            value: Box::new(value),
        }
    }

    /// Check if the contained value is of type T
    pub(crate) fn is_type<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub(crate) fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        if !self.is_type::<T>() {
            return None;
        }
        self.value.downcast_ref::<T>()
    }

    pub(crate) fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        if !self.is_type::<T>() {
            return None;
        }
        self.value.downcast_mut::<T>()
    }

    /// Unwrap the value, handing it back on mismatch so the caller can decide what to do
    pub(crate) fn into_inner<T: 'static>(self) -> Result<T, Self> {
        if !self.is_type::<T>() {
            return Err(self);
        }
        let type_id = self.type_id;
        self.value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|value| Self { type_id, value })
    }
}

#[cfg(test)]
mod tests {
    use super::AnyValue;

    #[test]
    fn test_downcast_respects_stored_type() {
        let mut value = AnyValue::new(7u32);
        assert!(value.is_type::<u32>());
        assert!(!value.is_type::<i32>());
        assert_eq!(value.downcast_ref::<u32>(), Some(&7));
        assert!(value.downcast_ref::<String>().is_none());

        if let Some(v) = value.downcast_mut::<u32>() {
            *v += 1;
        }
        assert_eq!(value.downcast_ref::<u32>(), Some(&8));
    }

    #[test]
    fn test_into_inner_returns_value_on_mismatch() {
        let value = AnyValue::new("conn".to_string());
        let value = match value.into_inner::<i64>() {
            Ok(_) => panic!("downcast to the wrong type succeeded"),
            Err(value) => value,
        };
        assert_eq!(value.into_inner::<String>().ok().as_deref(), Some("conn"));
    }
}
