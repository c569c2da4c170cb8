//! Per-session set of identities already counted.

use crate::types::FaceDescriptor;

/// A person counted in the current session.
///
/// The reference descriptor is fixed at registration; later sightings of
/// the same person never update it.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub label: String,
    pub reference: FaceDescriptor,
}

/// Ordered, append-only roster of identities for one tracking run.
///
/// Labels are assigned sequentially ("Student 1", "Student 2", ...) so they
/// are unique within the roster. The roster lives in memory only and is
/// dropped when tracking stops.
#[derive(Debug, Default)]
pub struct Roster {
    identities: Vec<Identity>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new identity for `descriptor` and return it.
    ///
    /// Callers register only after the matcher classified the descriptor as
    /// new, and before classifying the next descriptor of the same batch.
    pub fn register(&mut self, descriptor: FaceDescriptor) -> &Identity {
        let label = format!("Student {}", self.identities.len() + 1);
        self.identities.push(Identity {
            label,
            reference: descriptor,
        });
        &self.identities[self.identities.len() - 1]
    }

    pub fn lookup(&self, label: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.label == label)
    }

    /// Identities in registration order.
    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Descriptor length fixed by the first registration.
    pub fn dimension(&self) -> Option<usize> {
        self.identities.first().map(|i| i.reference.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{EuclideanMatcher, Matcher};

    #[test]
    fn test_register_assigns_sequential_labels() {
        let mut roster = Roster::new();
        assert_eq!(roster.register(FaceDescriptor::new(vec![0.0])).label, "Student 1");
        assert_eq!(roster.register(FaceDescriptor::new(vec![1.0])).label, "Student 2");
        assert_eq!(roster.len(), 2);
        let labels: Vec<_> = roster.identities().iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, ["Student 1", "Student 2"]);
    }

    #[test]
    fn test_lookup() {
        let mut roster = Roster::new();
        roster.register(FaceDescriptor::new(vec![0.25, 0.5]));

        let found = roster.lookup("Student 1").unwrap();
        assert_eq!(found.reference.values, vec![0.25, 0.5]);
        assert!(roster.lookup("Student 2").is_none());
    }

    #[test]
    fn test_register_then_classify_is_known() {
        let mut roster = Roster::new();
        let descriptor = FaceDescriptor::new(vec![0.3, 0.1, 0.7]);
        let label = roster.register(descriptor.clone()).label.clone();

        let result = EuclideanMatcher::default().classify(&descriptor, roster.identities());
        assert_eq!(result.label(), Some(label.as_str()));
    }

    #[test]
    fn test_dimension() {
        let mut roster = Roster::new();
        assert!(roster.is_empty());
        assert_eq!(roster.dimension(), None);
        roster.register(FaceDescriptor::new(vec![0.0; 128]));
        assert_eq!(roster.dimension(), Some(128));
    }
}
