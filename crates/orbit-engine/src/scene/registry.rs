use slotmap::SlotMap;

use crate::device::RenderBackend;
use crate::render::{ParticleSet, Programs, RenderContext, Shape};

use super::Drawable;

slotmap::new_key_type! {
    /// Stable handle to a drawable in a [`Scene`].
    pub struct DrawableKey;
}

/// Registry of drawables, drawn in insertion order.
#[derive(Debug, Default)]
pub struct Scene {
    items: SlotMap<DrawableKey, Drawable>,
    order: Vec<DrawableKey>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, drawable: impl Into<Drawable>) -> DrawableKey {
        let key = self.items.insert(drawable.into());
        self.order.push(key);
        key
    }

    /// Removes a drawable. The caller owns its GPU resources afterwards.
    pub fn remove(&mut self, key: DrawableKey) -> Option<Drawable> {
        let removed = self.items.remove(key)?;
        self.order.retain(|k| *k != key);
        Some(removed)
    }

    /// Swaps the drawable under `key` in place, keeping its draw position.
    pub fn replace(&mut self, key: DrawableKey, drawable: impl Into<Drawable>) -> Option<Drawable> {
        let slot = self.items.get_mut(key)?;
        Some(std::mem::replace(slot, drawable.into()))
    }

    pub fn get(&self, key: DrawableKey) -> Option<&Drawable> {
        self.items.get(key)
    }

    pub fn get_mut(&mut self, key: DrawableKey) -> Option<&mut Drawable> {
        self.items.get_mut(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drawables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (DrawableKey, &Drawable)> + '_ {
        self.order
            .iter()
            .filter_map(|&k| self.items.get(k).map(|d| (k, d)))
    }

    /// First particle set, if any.
    pub fn find_particles(&self) -> Option<DrawableKey> {
        self.iter()
            .find(|(_, d)| matches!(d, Drawable::Particles(_)))
            .map(|(k, _)| k)
    }

    pub fn particles_mut(&mut self) -> Option<&mut ParticleSet> {
        let key = self.find_particles()?;
        self.items.get_mut(key)?.as_particles_mut()
    }

    pub fn shapes_mut(&mut self) -> impl Iterator<Item = &mut Shape> + '_ {
        self.items.values_mut().filter_map(Drawable::as_shape_mut)
    }

    pub fn draw_all(
        &self,
        backend: &mut dyn RenderBackend,
        programs: &mut Programs,
        ctx: &RenderContext,
    ) {
        for (_, d) in self.iter() {
            d.draw(backend, programs, ctx);
        }
    }

    /// Disposes and removes every drawable.
    pub fn dispose(&mut self, backend: &mut dyn RenderBackend) {
        for (_, mut d) in self.items.drain() {
            d.dispose(backend);
        }
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Extent, HeadlessBackend};
    use crate::render::PointSize;
    use crate::sim::ParticlePool;

    fn particles(backend: &mut HeadlessBackend) -> ParticleSet {
        let mut pool = ParticlePool::initialize(4).unwrap();
        pool.seed(2).unwrap();
        ParticleSet::new(backend, pool, PointSize::default(), 4).unwrap()
    }

    #[test]
    fn draws_follow_insertion_order() {
        let mut backend = HeadlessBackend::new(Extent::new(8, 8));
        let mut programs = Programs::compile(&mut backend).unwrap();
        let ctx = RenderContext::new(Extent::new(8, 8), 1.0);

        let mut scene = Scene::new();
        scene.insert(Shape::quad(&mut backend, 1.0, 1.0, true).unwrap());
        let p = particles(&mut backend);
        scene.insert(p);
        scene.insert(Shape::circle(&mut backend, 8, false).unwrap());

        scene.draw_all(&mut backend, &mut programs, &ctx);
        let labels: Vec<&str> = backend.draws().iter().map(|d| d.program.as_str()).collect();
        assert_eq!(labels, ["flat", "particles", "flat"]);
    }

    #[test]
    fn find_and_replace_particles_keeps_position() {
        let mut backend = HeadlessBackend::new(Extent::new(8, 8));
        let mut scene = Scene::new();
        let first = scene.insert(Shape::quad(&mut backend, 1.0, 1.0, true).unwrap());
        let p = particles(&mut backend);
        let key = scene.insert(p);
        assert_eq!(scene.find_particles(), Some(key));

        let fresh = particles(&mut backend);
        let mut old = scene.replace(key, fresh).unwrap();
        old.dispose(&mut backend);

        let keys: Vec<DrawableKey> = scene.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, [first, key]);
        assert!(scene.particles_mut().is_some());
    }

    #[test]
    fn remove_and_dispose() {
        let mut backend = HeadlessBackend::new(Extent::new(8, 8));
        let mut scene = Scene::new();
        let key = scene.insert(Shape::quad(&mut backend, 1.0, 1.0, true).unwrap());
        scene.insert(Shape::circle(&mut backend, 8, true).unwrap());

        let mut removed = scene.remove(key).unwrap();
        removed.dispose(&mut backend);
        assert_eq!(scene.len(), 1);
        assert!(scene.find_particles().is_none());

        scene.dispose(&mut backend);
        assert!(scene.is_empty());
        assert_eq!(backend.live_resources(), 0);
    }
}
