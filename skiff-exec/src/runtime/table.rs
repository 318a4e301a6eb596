//! Table instance: a growable vector of nullable function references
//! (store addresses).

use skiff_wasm::model::{RefType, TableType};

#[derive(Debug, Clone)]
pub struct TableInstance {
    elems: Vec<Option<usize>>,
    elem_type: RefType,
    max: Option<u32>,
}

impl TableInstance {
    pub fn new(ty: &TableType) -> Self {
        Self {
            elems: vec![None; ty.limits.min as usize],
            elem_type: ty.elem,
            max: ty.limits.max,
        }
    }

    pub fn elem_type(&self) -> RefType {
        self.elem_type
    }

    pub fn size(&self) -> u32 {
        self.elems.len() as u32
    }

    /// Outer None: index out of bounds. Inner None: null reference.
    pub fn get(&self, idx: u32) -> Option<Option<usize>> {
        self.elems.get(idx as usize).copied()
    }

    pub fn set(&mut self, idx: u32, val: Option<usize>) -> Result<(), ()> {
        match self.elems.get_mut(idx as usize) {
            Some(slot) => {
                *slot = val;
                Ok(())
            }
            None => Err(()),
        }
    }

    /// Grow by delta slots filled with `init`. Returns the previous size, or
    /// None if the declared max would be exceeded.
    pub fn grow(&mut self, delta: u32, init: Option<usize>) -> Option<u32> {
        let prev = self.size();
        let new = prev.checked_add(delta)?;
        if let Some(max) = self.max {
            if new > max {
                return None;
            }
        }
        self.elems.resize(new as usize, init);
        Some(prev)
    }

    /// table.fill: set `len` slots starting at `dst`. All-or-nothing.
    pub fn fill(&mut self, dst: u32, val: Option<usize>, len: u32) -> Result<(), ()> {
        let start = dst as usize;
        let end = start.checked_add(len as usize).ok_or(())?;
        if end > self.elems.len() {
            return Err(());
        }
        self.elems[start..end].fill(val);
        Ok(())
    }

    /// table.init / table.copy write path: copy a resolved slice of
    /// references into the table. All-or-nothing.
    pub fn init(&mut self, dst: u32, refs: &[Option<usize>]) -> Result<(), ()> {
        let start = dst as usize;
        let end = start.checked_add(refs.len()).ok_or(())?;
        if end > self.elems.len() {
            return Err(());
        }
        self.elems[start..end].copy_from_slice(refs);
        Ok(())
    }

    /// Read a slice of slots for table.copy.
    pub fn slots(&self, src: u32, len: u32) -> Result<Vec<Option<usize>>, ()> {
        let start = src as usize;
        let end = start.checked_add(len as usize).ok_or(())?;
        if end > self.elems.len() {
            return Err(());
        }
        Ok(self.elems[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_wasm::model::Limits;

    fn table(min: u32, max: Option<u32>) -> TableInstance {
        TableInstance::new(&TableType {
            elem: RefType::FuncRef,
            limits: Limits { min, max },
        })
    }

    #[test]
    fn get_set_grow() {
        let mut t = table(2, Some(3));
        assert_eq!(t.size(), 2);
        assert_eq!(t.get(0), Some(None));
        assert_eq!(t.get(2), None);
        t.set(1, Some(7)).unwrap();
        assert_eq!(t.get(1), Some(Some(7)));
        assert_eq!(t.grow(1, Some(9)), Some(2));
        assert_eq!(t.get(2), Some(Some(9)));
        assert!(t.grow(1, None).is_none());
    }

    #[test]
    fn fill_and_init_bounds() {
        let mut t = table(4, None);
        t.fill(1, Some(3), 2).unwrap();
        assert_eq!(t.get(1), Some(Some(3)));
        assert_eq!(t.get(3), Some(None));
        assert!(t.fill(3, Some(1), 2).is_err());
        // Failed fill did not touch anything.
        assert_eq!(t.get(3), Some(None));

        t.init(0, &[Some(5), None]).unwrap();
        assert_eq!(t.get(0), Some(Some(5)));
        assert!(t.init(3, &[None, None]).is_err());
    }
}
