//! Renderer instances cached by configuration.

use crate::engine::MapMode;
use std::collections::HashMap;

/// Configuration a renderer instance is built for. Scenarios with equal keys
/// share one instance, including whatever style state the previous scenario
/// left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RendererKey {
    pub map_mode: MapMode,
    /// `f32::to_bits` of the pixel ratio.
    pixel_ratio_bits: u32,
    pub cross_source_collisions: bool,
}

impl RendererKey {
    pub fn new(map_mode: MapMode, pixel_ratio: f32, cross_source_collisions: bool) -> Self {
        // -0.0 and 0.0 must land on the same key.
        let pixel_ratio = if pixel_ratio == 0.0 { 0.0 } else { pixel_ratio };
        Self {
            map_mode,
            pixel_ratio_bits: pixel_ratio.to_bits(),
            cross_source_collisions,
        }
    }

    pub fn pixel_ratio(&self) -> f32 {
        f32::from_bits(self.pixel_ratio_bits)
    }
}

impl std::fmt::Display for RendererKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.map_mode,
            self.pixel_ratio(),
            u8::from(self.cross_source_collisions)
        )
    }
}

#[derive(Debug)]
pub struct RendererCache<T> {
    entries: HashMap<RendererKey, T>,
}

impl<T> Default for RendererCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RendererCache<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &RendererKey) -> Option<&T> {
        self.entries.get(key)
    }

    /// Returns the instance cached under `key`, building it with `create` on a
    /// miss. A failed `create` leaves the cache untouched.
    pub fn get_or_insert_with<E>(
        &mut self,
        key: RendererKey,
        create: impl FnOnce() -> Result<T, E>,
    ) -> Result<&mut T, E> {
        match self.entries.entry(key) {
            std::collections::hash_map::Entry::Occupied(entry) => Ok(entry.into_mut()),
            std::collections::hash_map::Entry::Vacant(entry) => {
                log::debug!("Creating renderer for {key}");
                Ok(entry.insert(create()?))
            }
        }
    }

    /// Drops every cached instance.
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}
