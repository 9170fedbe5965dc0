use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use hashbrown::HashMap;
use log::{debug, trace};
use ps_io::{RecordHandle, RecordWriter};
use ps_record::{FieldName, PropertySheet, Record, RecordRef, TypeTag, Value};

use crate::error::PackError;
use crate::object::{Obj, ObjId, Packable};

// -----------------------------------------------------------------------------
// PackBuilder

/// The field sink handed to [`Packable::pack`].
///
/// Primitive state goes through [`field`](PackBuilder::field); child objects
/// go through [`object`](PackBuilder::object), which returns after the
/// session has assigned the child a reference; the child's record is
/// emitted by the session, never inlined. Field order is preserved, which
/// is what makes output deterministic.
///
/// Raw [`Value::Ref`] values are rejected in [`field`](PackBuilder::field):
/// references are only produced by the session, so a pack implementation
/// cannot forge an edge to a record it never visited.
pub struct PackBuilder<'a> {
    tag: TypeTag,
    hints: &'a PropertySheet,
    session: Option<&'a mut (dyn Visit + 'a)>,
    fields: Vec<(FieldName, Value)>,
}

impl PackBuilder<'_> {
    /// Returns the hints supplied for this call.
    pub fn hints(&self) -> &PropertySheet {
        self.hints
    }

    /// Writes one primitive field.
    pub fn field(
        &mut self,
        name: impl Into<FieldName>,
        value: impl Into<Value>,
    ) -> Result<(), PackError> {
        let name = name.into();
        if name.is_empty() {
            return Err(PackError::EmptyFieldName {
                tag: self.tag.clone(),
            });
        }
        let value = value.into();
        if !value.is_reference_free() {
            return Err(PackError::RawReference {
                tag: self.tag.clone(),
                field: name,
            });
        }
        self.fields.push((name, value));
        Ok(())
    }

    /// Writes a child object field.
    ///
    /// The child is assigned a reference the first time any object in the
    /// session encounters it; later encounters reuse the same reference, so
    /// shared children are emitted once and cycles terminate.
    pub fn object(&mut self, name: impl Into<FieldName>, child: &Obj) -> Result<(), PackError> {
        let name = name.into();
        if name.is_empty() {
            return Err(PackError::EmptyFieldName {
                tag: self.tag.clone(),
            });
        }
        let Some(session) = self.session.as_deref_mut() else {
            return Err(PackError::ObjectOutsideSession {
                tag: self.tag.clone(),
                field: name,
            });
        };
        let reference = session.visit_object(child)?;
        self.fields.push((name, Value::Ref(reference)));
        Ok(())
    }

    /// Writes a child object field from a typed cell.
    pub fn object_of<T: Packable>(
        &mut self,
        name: impl Into<FieldName>,
        child: &Rc<RefCell<T>>,
    ) -> Result<(), PackError> {
        let child: Obj = child.clone();
        self.object(name, &child)
    }

    /// Writes a list field of child objects.
    pub fn objects<'o>(
        &mut self,
        name: impl Into<FieldName>,
        children: impl IntoIterator<Item = &'o Obj>,
    ) -> Result<(), PackError> {
        let name = name.into();
        if name.is_empty() {
            return Err(PackError::EmptyFieldName {
                tag: self.tag.clone(),
            });
        }
        let Some(session) = self.session.as_deref_mut() else {
            return Err(PackError::ObjectOutsideSession {
                tag: self.tag.clone(),
                field: name,
            });
        };
        let mut items = Vec::new();
        for child in children {
            items.push(Value::Ref(session.visit_object(child)?));
        }
        self.fields.push((name, Value::List(items)));
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Encoder

/// Reference assignment, the part of the session a builder can see.
trait Visit {
    fn visit_object(&mut self, child: &Obj) -> Result<RecordRef, PackError>;
}

struct Encoder<'w> {
    writer: &'w mut dyn RecordWriter,
    hints: &'w PropertySheet,
    seen: HashMap<ObjId, RecordRef>,
    // Pinned for the session so an address cannot be reused for a second
    // object while its id is still in `seen`.
    retained: Vec<Obj>,
    queue: VecDeque<(Obj, RecordHandle)>,
}

impl Visit for Encoder<'_> {
    fn visit_object(&mut self, child: &Obj) -> Result<RecordRef, PackError> {
        let id = ObjId::of(child);
        if let Some(&reference) = self.seen.get(&id) {
            return Ok(reference);
        }
        let tag = child
            .try_borrow()
            .map_err(|_| PackError::BorrowConflict)?
            .state_tag();
        let handle = self.writer.begin_record(&tag)?;
        let reference = handle.reference();
        trace!("assigned {reference} to object tagged `{tag}`");
        self.seen.insert(id, reference);
        self.retained.push(child.clone());
        self.queue.push_back((child.clone(), handle));
        Ok(reference)
    }
}

impl Encoder<'_> {
    fn run(&mut self) -> Result<(), PackError> {
        while let Some((object, handle)) = self.queue.pop_front() {
            let expected = handle.reference();
            let guard = object.try_borrow().map_err(|_| PackError::BorrowConflict)?;
            let hints = self.hints;
            let mut builder = PackBuilder {
                tag: guard.state_tag(),
                hints,
                session: Some(self),
                fields: Vec::new(),
            };
            guard.pack(&mut builder)?;
            let fields = builder.fields;
            drop(guard);
            for (name, value) in fields {
                self.writer.write_field(&handle, &name, value)?;
            }
            let sealed = self.writer.end_record(handle)?;
            if sealed != expected {
                return Err(PackError::ReferenceMismatch {
                    expected,
                    found: sealed,
                });
            }
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Entry points

/// Serializes an object graph through the given writer.
///
/// Returns the reference assigned to the root. The traversal assigns each
/// distinct object identity a reference the first time it is encountered,
/// emits each record exactly once, and establishes reference edges before a
/// parent record is completed: a child that points back at an in-progress
/// parent receives the parent's already-assigned reference instead of being
/// re-entered, so cycles are safe by construction. An explicit work queue
/// keeps deep graphs off the call stack.
///
/// The writer, like the hints, is a per-call capability: nothing about the
/// output medium is resolved globally.
pub fn pack_graph(
    root: &Obj,
    writer: &mut dyn RecordWriter,
    hints: &PropertySheet,
) -> Result<RecordRef, PackError> {
    let mut encoder = Encoder {
        writer,
        hints,
        seen: HashMap::new(),
        retained: Vec::new(),
        queue: VecDeque::new(),
    };
    let root_ref = encoder.visit_object(root)?;
    encoder.run()?;
    debug!(
        "packed {} records from graph rooted at {root_ref}",
        encoder.seen.len()
    );
    Ok(root_ref)
}

/// Packs a single object into a standalone [`Record`].
///
/// No session is running, so the object must have no object-valued fields;
/// writing one fails with [`PackError::ObjectOutsideSession`]. The record is
/// given reference `@0`.
pub fn pack_object(object: &Obj, hints: &PropertySheet) -> Result<Record, PackError> {
    let guard = object.try_borrow().map_err(|_| PackError::BorrowConflict)?;
    let tag = guard.state_tag();
    let mut builder = PackBuilder {
        tag: tag.clone(),
        hints,
        session: None,
        fields: Vec::new(),
    };
    guard.pack(&mut builder)?;
    let mut record = Record::new(tag, RecordRef::new(0));
    for (name, value) in builder.fields {
        record.push(name, value);
    }
    Ok(record)
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::{PackBuilder, pack_graph, pack_object};
    use crate::error::PackError;
    use crate::object::{Obj, Packable, obj};
    use alloc::string::String;
    use alloc::vec::Vec;
    use ps_io::{MemoryWriter, RecordWriter};
    use ps_record::{PropertySheet, RecordRef, TypeTag, Value};

    struct Leaf {
        label: String,
    }

    impl Packable for Leaf {
        fn state_tag(&self) -> TypeTag {
            TypeTag::new("demo.leaf")
        }

        fn pack(&self, rec: &mut PackBuilder<'_>) -> Result<(), PackError> {
            rec.field("label", self.label.as_str())
        }
    }

    struct Fork {
        left: Obj,
        right: Obj,
    }

    impl Packable for Fork {
        fn state_tag(&self) -> TypeTag {
            TypeTag::new("demo.fork")
        }

        fn pack(&self, rec: &mut PackBuilder<'_>) -> Result<(), PackError> {
            rec.object("left", &self.left)?;
            rec.object("right", &self.right)
        }
    }

    fn leaf(label: &str) -> Obj {
        obj(Leaf {
            label: String::from(label),
        })
    }

    fn pack_to_set(root: &Obj) -> ps_io::RecordSet {
        let mut writer = MemoryWriter::new();
        pack_graph(root, &mut writer, &PropertySheet::new()).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn shared_children_are_emitted_once() {
        let shared = leaf("shared");
        let root = obj(Fork {
            left: shared.clone(),
            right: shared,
        });

        let set = pack_to_set(&root);
        assert_eq!(set.len(), 2);
        let fork = set.get(RecordRef::new(0)).unwrap();
        assert_eq!(fork.get("left"), fork.get("right"));
    }

    #[test]
    fn equal_but_separate_objects_get_separate_records() {
        let root = obj(Fork {
            left: leaf("same"),
            right: leaf("same"),
        });

        let set = pack_to_set(&root);
        assert_eq!(set.len(), 3);
        let fork = set.get(RecordRef::new(0)).unwrap();
        assert_ne!(fork.get("left"), fork.get("right"));
    }

    #[test]
    fn output_is_deterministic_across_runs() {
        let shared = leaf("s");
        let root = obj(Fork {
            left: shared.clone(),
            right: obj(Fork {
                left: shared,
                right: leaf("r"),
            }),
        });

        let first = pack_to_set(&root);
        let second = pack_to_set(&root);
        assert_eq!(first, second);
    }

    #[test]
    fn deep_graphs_do_not_recurse() {
        struct Link {
            next: Option<Obj>,
        }

        impl Packable for Link {
            fn state_tag(&self) -> TypeTag {
                TypeTag::new("demo.link")
            }

            fn pack(&self, rec: &mut PackBuilder<'_>) -> Result<(), PackError> {
                match &self.next {
                    Some(next) => rec.object("next", next),
                    None => rec.field("end", true),
                }
            }
        }

        let mut head = obj(Link { next: None });
        for _ in 0..10_000 {
            head = obj(Link { next: Some(head) });
        }

        let set = pack_to_set(&head);
        assert_eq!(set.len(), 10_001);

        // Dismantle the chain iteratively; a recursive drop of ten thousand
        // links would blow the stack this test exists to protect.
        let mut cursor = Some(head);
        while let Some(link) = cursor {
            cursor = crate::object::downcast_mut::<Link>(&link).and_then(|mut l| l.next.take());
        }
    }

    #[test]
    fn raw_references_are_rejected() {
        struct Forger;

        impl Packable for Forger {
            fn state_tag(&self) -> TypeTag {
                TypeTag::new("demo.forger")
            }

            fn pack(&self, rec: &mut PackBuilder<'_>) -> Result<(), PackError> {
                rec.field("stolen", Value::Ref(RecordRef::new(40)))
            }
        }

        let mut writer = MemoryWriter::new();
        let result = pack_graph(&obj(Forger), &mut writer, &PropertySheet::new());
        assert!(matches!(result, Err(PackError::RawReference { .. })));
    }

    #[test]
    fn empty_field_names_are_rejected() {
        struct Nameless;

        impl Packable for Nameless {
            fn state_tag(&self) -> TypeTag {
                TypeTag::new("demo.nameless")
            }

            fn pack(&self, rec: &mut PackBuilder<'_>) -> Result<(), PackError> {
                rec.field("", 1)
            }
        }

        let mut writer = MemoryWriter::new();
        let result = pack_graph(&obj(Nameless), &mut writer, &PropertySheet::new());
        assert!(matches!(result, Err(PackError::EmptyFieldName { .. })));
    }

    #[test]
    fn pack_object_refuses_object_fields() {
        let record = pack_object(&leaf("solo"), &PropertySheet::new()).unwrap();
        assert_eq!(record.tag(), &TypeTag::new("demo.leaf"));
        assert_eq!(record.get("label"), Some(&Value::Text("solo".into())));

        let fork = obj(Fork {
            left: leaf("a"),
            right: leaf("b"),
        });
        assert!(matches!(
            pack_object(&fork, &PropertySheet::new()),
            Err(PackError::ObjectOutsideSession { .. })
        ));
    }

    #[test]
    fn list_fields_carry_references_in_order() {
        struct Hub {
            spokes: Vec<Obj>,
        }

        impl Packable for Hub {
            fn state_tag(&self) -> TypeTag {
                TypeTag::new("demo.hub")
            }

            fn pack(&self, rec: &mut PackBuilder<'_>) -> Result<(), PackError> {
                rec.objects("spokes", self.spokes.iter())
            }
        }

        let root = obj(Hub {
            spokes: alloc::vec![leaf("a"), leaf("b")],
        });
        let set = pack_to_set(&root);
        assert_eq!(set.len(), 3);
        let hub = set.get(RecordRef::new(0)).unwrap();
        let spokes = hub.get("spokes").and_then(Value::as_list).unwrap();
        assert_eq!(
            spokes,
            &[
                Value::Ref(RecordRef::new(1)),
                Value::Ref(RecordRef::new(2))
            ]
        );
    }

    #[test]
    fn hints_are_visible_to_pack_implementations() {
        struct Chatty;

        impl Packable for Chatty {
            fn state_tag(&self) -> TypeTag {
                TypeTag::new("demo.chatty")
            }

            fn pack(&self, rec: &mut PackBuilder<'_>) -> Result<(), PackError> {
                let verbose = rec
                    .hints()
                    .get("verbose")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if verbose {
                    rec.field("extra", "details")?;
                }
                rec.field("core", 1)
            }
        }

        let mut hints = PropertySheet::new();
        hints.set("verbose", true).unwrap();

        let mut writer = MemoryWriter::new();
        pack_graph(&obj(Chatty), &mut writer, &hints).unwrap();
        let set = writer.finish().unwrap();
        assert!(set.get(RecordRef::new(0)).unwrap().contains("extra"));
    }

    #[test]
    fn writer_reference_mismatch_is_detected() {
        struct SkewedWriter {
            inner: MemoryWriter,
        }

        impl RecordWriter for SkewedWriter {
            fn begin_record(
                &mut self,
                tag: &TypeTag,
            ) -> Result<ps_io::RecordHandle, ps_io::WriteError> {
                self.inner.begin_record(tag)
            }

            fn write_field(
                &mut self,
                handle: &ps_io::RecordHandle,
                name: &str,
                value: Value,
            ) -> Result<(), ps_io::WriteError> {
                self.inner.write_field(handle, name, value)
            }

            fn end_record(
                &mut self,
                handle: ps_io::RecordHandle,
            ) -> Result<RecordRef, ps_io::WriteError> {
                self.inner.end_record(handle)?;
                Ok(RecordRef::new(99))
            }
        }

        let mut writer = SkewedWriter {
            inner: MemoryWriter::new(),
        };
        let result = pack_graph(&leaf("x"), &mut writer, &PropertySheet::new());
        assert!(matches!(
            result,
            Err(PackError::ReferenceMismatch { .. })
        ));
    }
}
