use std::collections::VecDeque;

use raven_common::time::UnixTimestamp;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::{Level, Object};

/// Default number of breadcrumbs retained by a [`BreadcrumbBuffer`].
pub const DEFAULT_BREADCRUMBS_CAPACITY: usize = 100;

/// A timestamped note of prior application activity.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Breadcrumb {
    /// When the breadcrumb was recorded.
    pub timestamp: UnixTimestamp,

    /// The type of the breadcrumb, for example `http` or `navigation`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,

    /// Dotted category, for example `ui.click`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Free text message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Severity of the breadcrumb.
    #[serde(default = "default_breadcrumb_level")]
    pub level: Level,

    /// Structured data.
    #[serde(default, skip_serializing_if = "Object::is_empty")]
    pub data: Object,
}

fn default_breadcrumb_level() -> Level {
    Level::Info
}

impl Default for Breadcrumb {
    fn default() -> Self {
        Self {
            timestamp: UnixTimestamp::now(),
            ty: None,
            category: None,
            message: None,
            level: default_breadcrumb_level(),
            data: Object::new(),
        }
    }
}

/// A fixed-capacity FIFO of breadcrumbs. The oldest entry is dropped on overflow.
#[derive(Clone, Debug, PartialEq)]
pub struct BreadcrumbBuffer {
    capacity: usize,
    buffer: VecDeque<Breadcrumb>,
}

impl BreadcrumbBuffer {
    /// Creates an empty buffer retaining at most `capacity` breadcrumbs.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: VecDeque::with_capacity(capacity.min(DEFAULT_BREADCRUMBS_CAPACITY)),
        }
    }

    /// Appends a breadcrumb, evicting the oldest one if the buffer is full.
    pub fn record(&mut self, breadcrumb: Breadcrumb) {
        if self.capacity == 0 {
            return;
        }

        while self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }

        self.buffer.push_back(breadcrumb);
    }

    /// Removes all breadcrumbs.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Returns the most recently recorded breadcrumb.
    pub fn peek(&self) -> Option<&Breadcrumb> {
        self.buffer.back()
    }

    /// Iterates breadcrumbs from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Breadcrumb> {
        self.buffer.iter()
    }

    /// Returns the number of retained breadcrumbs.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if no breadcrumbs are retained.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the maximum number of retained breadcrumbs.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BreadcrumbBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BREADCRUMBS_CAPACITY)
    }
}

impl Serialize for BreadcrumbBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let values: Vec<&Breadcrumb> = self.buffer.iter().collect();
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("values", &values)?;
        map.end()
    }
}
