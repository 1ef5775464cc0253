//! Runtime environments: flat slot arrays linked by a parent pointer.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::datum::Datum;

/// Slot 0 is reserved for the parent-environment link.
pub const PARENT_SLOT: usize = 0;
/// Variable slots start after the reserved slots.
pub const RESERVED_SLOTS: usize = 1;

pub type EnvRef = Rc<Frame>;

/// One runtime environment frame.
///
/// Allocated once per lambda invocation (or once for the top level) and
/// shared by reference among every closure that captures it. Slot indices
/// follow the compiler's layout: index 0 is reserved for the parent link
/// (held here as a typed field), variables occupy `1..env_size` in
/// declaration order.
pub struct Frame {
    parent: Option<EnvRef>,
    slots: RefCell<Box<[Datum]>>,
}

impl Frame {
    /// Allocate a frame with every variable slot unspecified.
    pub fn new(parent: Option<EnvRef>, size: usize) -> EnvRef {
        Rc::new(Frame {
            parent,
            slots: RefCell::new(vec![Datum::Unspec; size.max(RESERVED_SLOTS)].into()),
        })
    }

    pub fn parent(&self) -> Option<&EnvRef> {
        self.parent.as_ref()
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        false // every frame has at least the reserved slot
    }

    /// Walk `depth` parent links, then read a slot.
    pub fn get(self: &Rc<Self>, depth: u32, slot: u32) -> Datum {
        let mut frame = Rc::clone(self);
        for _ in 0..depth {
            let next = match frame.parent() {
                Some(p) => Rc::clone(p),
                None => unreachable!("lexical depth exceeds the environment chain"),
            };
            frame = next;
        }
        let value = frame.slots.borrow()[slot as usize].clone();
        value
    }

    /// Walk `depth` parent links, then write a slot.
    pub fn set(self: &Rc<Self>, depth: u32, slot: u32, value: Datum) {
        let mut frame = Rc::clone(self);
        for _ in 0..depth {
            let next = match frame.parent() {
                Some(p) => Rc::clone(p),
                None => unreachable!("lexical depth exceeds the environment chain"),
            };
            frame = next;
        }
        frame.slots.borrow_mut()[slot as usize] = value;
    }

    /// Read a slot of this frame directly.
    pub fn local_get(&self, slot: usize) -> Datum {
        self.slots.borrow()[slot].clone()
    }

    /// Write a slot of this frame directly.
    pub fn local_set(&self, slot: usize, value: Datum) {
        self.slots.borrow_mut()[slot] = value;
    }

    /// Argument `n` of a host-procedure invocation.
    pub fn arg(&self, n: usize) -> Datum {
        self.local_get(RESERVED_SLOTS + n)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#<env:{} slots{}>",
            self.len(),
            if self.parent.is_some() { " +parent" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_start_unspecified() {
        let env = Frame::new(None, 4);
        assert!(matches!(env.local_get(1), Datum::Unspec));
        assert!(matches!(env.local_get(3), Datum::Unspec));
    }

    #[test]
    fn test_get_set_through_parent_chain() {
        let top = Frame::new(None, 3);
        top.local_set(1, Datum::fix(42));
        let mid = Frame::new(Some(Rc::clone(&top)), 2);
        let leaf = Frame::new(Some(Rc::clone(&mid)), 2);

        assert!(leaf.get(2, 1).eqv(&Datum::fix(42)));
        leaf.set(2, 1, Datum::fix(7));
        assert!(top.local_get(1).eqv(&Datum::fix(7)));

        leaf.set(0, 1, Datum::fix(9));
        assert!(leaf.get(0, 1).eqv(&Datum::fix(9)));
        assert!(matches!(mid.local_get(1), Datum::Unspec));
    }

    #[test]
    fn test_sharing_is_by_reference() {
        let env = Frame::new(None, 2);
        let alias = Rc::clone(&env);
        env.local_set(1, Datum::fix(1));
        assert!(alias.local_get(1).eqv(&Datum::fix(1)));
    }
}
