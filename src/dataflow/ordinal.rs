use std::collections::BTreeMap;

/// Arena assigning dense, stable ordinals to values in first-seen order.
#[derive(Clone, Debug)]
pub(crate) struct OrdinalMapping<T> {
    objects: Vec<T>,
    ordinals: BTreeMap<T, usize>,
}

impl<T> Default for OrdinalMapping<T> {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
            ordinals: BTreeMap::new(),
        }
    }
}

impl<T> OrdinalMapping<T>
where
    T: Clone + Ord,
{
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Ordinal of `object`, assigning the next one on first sight.
    pub(crate) fn add(&mut self, object: T) -> usize {
        if let Some(&ordinal) = self.ordinals.get(&object) {
            return ordinal;
        }
        let ordinal = self.objects.len();
        self.objects.push(object.clone());
        self.ordinals.insert(object, ordinal);
        ordinal
    }

    #[allow(dead_code)]
    pub(crate) fn ordinal(&self, object: &T) -> Option<usize> {
        self.ordinals.get(object).copied()
    }

    /// Stop growing; the result fixes the solver's domain size.
    pub(crate) fn freeze(self) -> FrozenOrdinals<T> {
        FrozenOrdinals {
            objects: self.objects,
        }
    }
}

/// Read-only ordinal table used during and after the fixpoint.
#[derive(Clone, Debug)]
pub(crate) struct FrozenOrdinals<T> {
    objects: Vec<T>,
}

impl<T> FrozenOrdinals<T> {
    pub(crate) fn domain_size(&self) -> usize {
        self.objects.len()
    }

    pub(crate) fn mapped_object(&self, ordinal: usize) -> Option<&T> {
        self.objects.get(ordinal)
    }
}
