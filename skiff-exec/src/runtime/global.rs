//! Global instance: value plus mutability per declared type.

use skiff_wasm::model::GlobalType;

use crate::values::Value;

#[derive(Debug, Clone)]
pub struct GlobalInstance {
    ty: GlobalType,
    val: Value,
}

impl GlobalInstance {
    pub fn new(ty: GlobalType, init: Value) -> Self {
        Self { ty, val: init }
    }

    pub fn get(&self) -> Value {
        self.val
    }

    pub fn set(&mut self, v: Value) -> Result<(), ()> {
        if self.ty.mutable {
            self.val = v;
            Ok(())
        } else {
            Err(())
        }
    }

    /// Raw pointer to the stored value for the compiled-code fast path.
    pub(crate) fn value_ptr(&mut self) -> *mut Value {
        &mut self.val
    }

    pub fn ty(&self) -> &GlobalType {
        &self.ty
    }
}
