//! Element instance: the runtime image of an element segment, consumed by
//! `table.init` until dropped.

use skiff_wasm::model::RefType;

#[derive(Debug, Clone)]
pub struct ElementInstance {
    ty: RefType,
    refs: Vec<Option<usize>>,
}

impl ElementInstance {
    pub fn new(ty: RefType, refs: Vec<Option<usize>>) -> Self {
        Self { ty, refs }
    }

    pub fn elem_type(&self) -> RefType {
        self.ty
    }

    pub fn refs(&self) -> &[Option<usize>] {
        &self.refs
    }

    pub fn len(&self) -> u32 {
        self.refs.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// elem.drop: release the segment contents. Subsequent `table.init`
    /// sees a zero-length segment, so any nonzero range traps.
    pub fn drop_refs(&mut self) {
        self.refs = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_empties() {
        let mut e = ElementInstance::new(RefType::FuncRef, vec![Some(1), None]);
        assert_eq!(e.len(), 2);
        e.drop_refs();
        assert!(e.is_empty());
    }
}
