//! Block registry: a dense, O(1) id-indexed catalog.
//!
//! Registration happens once at startup; afterwards the registry is shared
//! read-only (typically as an `Arc`) across the tick thread and workers.

use crate::block::{
    Aabb, BlockDef, BlockId, RenderShape, AIR_DEF, BLOCK_COAL_ORE, BLOCK_DIAMOND_ORE, BLOCK_DIRT,
    BLOCK_FLOWER, BLOCK_GLASS, BLOCK_GOLD_ORE, BLOCK_GRASS, BLOCK_GRAVEL, BLOCK_IRON_ORE,
    BLOCK_SAND, BLOCK_SNOW, BLOCK_STONE, BLOCK_TALL_GRASS, BLOCK_TORCH, BLOCK_WATER,
    BLOCK_WATER_1, BLOCK_WATER_2, BLOCK_WATER_3, TORCH_LIGHT_LEVEL,
};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::warn;

/// Id-indexed block catalog.
pub struct BlockRegistry {
    defs: Vec<Option<BlockDef>>,
    /// Ids already warned about, so unknown-id lookups log once per id.
    unknown_warned: Mutex<HashSet<BlockId>>,
}

impl BlockRegistry {
    /// Empty registry containing only air.
    pub fn new() -> Self {
        let mut registry = Self {
            defs: Vec::new(),
            unknown_warned: Mutex::new(HashSet::new()),
        };
        registry.register(AIR_DEF);
        registry
    }

    /// Registry preloaded with the built-in block set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(BlockDef::solid(BLOCK_STONE, "stone", 1.5));
        registry.register(BlockDef::solid(BLOCK_DIRT, "dirt", 0.5));
        registry.register(BlockDef {
            tags: &["soil"],
            ..BlockDef::solid(BLOCK_GRASS, "grass", 0.6)
        });
        registry.register(BlockDef::solid(BLOCK_SAND, "sand", 0.5));
        registry.register(BlockDef::solid(BLOCK_GRAVEL, "gravel", 0.6));
        registry.register(BlockDef::solid(BLOCK_SNOW, "snow", 0.2));
        registry.register(BlockDef::water(BLOCK_WATER, "water"));
        registry.register(BlockDef::water(BLOCK_WATER_3, "water_3"));
        registry.register(BlockDef::water(BLOCK_WATER_2, "water_2"));
        registry.register(BlockDef::water(BLOCK_WATER_1, "water_1"));
        registry.register(BlockDef {
            light_level: TORCH_LIGHT_LEVEL,
            shape: RenderShape::CustomGeometry,
            collision: None,
            ..BlockDef::foliage(BLOCK_TORCH, "torch")
        });
        registry.register(BlockDef {
            tags: &["ore"],
            ..BlockDef::solid(BLOCK_COAL_ORE, "coal_ore", 3.0)
        });
        registry.register(BlockDef {
            tags: &["ore"],
            ..BlockDef::solid(BLOCK_IRON_ORE, "iron_ore", 3.0)
        });
        registry.register(BlockDef {
            tags: &["ore"],
            ..BlockDef::solid(BLOCK_GOLD_ORE, "gold_ore", 3.0)
        });
        registry.register(BlockDef {
            tags: &["ore"],
            ..BlockDef::solid(BLOCK_DIAMOND_ORE, "diamond_ore", 3.0)
        });
        registry.register(BlockDef::foliage(BLOCK_TALL_GRASS, "tall_grass"));
        registry.register(BlockDef::foliage(BLOCK_FLOWER, "flower"));
        registry.register(BlockDef {
            collision: Some(Aabb::FULL),
            ..BlockDef::transparent(BLOCK_GLASS, "glass", 0.3)
        });
        registry
    }

    /// Register a block definition.
    ///
    /// Double registration is a warning, not an error; the new definition
    /// replaces the old one.
    pub fn register(&mut self, def: BlockDef) {
        let idx = def.id as usize;
        if idx >= self.defs.len() {
            self.defs.resize(idx + 1, None);
        }
        if let Some(existing) = &self.defs[idx] {
            warn!(
                id = def.id,
                old = existing.name,
                new = def.name,
                "block id registered twice; replacing"
            );
        }
        self.defs[idx] = Some(def);
    }

    /// Look up a block definition.
    ///
    /// Unknown ids resolve to air; the first lookup of each unknown id logs
    /// a warning.
    pub fn get(&self, id: BlockId) -> &BlockDef {
        match self.defs.get(id as usize).and_then(|slot| slot.as_ref()) {
            Some(def) => def,
            None => {
                let mut warned = self
                    .unknown_warned
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if warned.insert(id) {
                    warn!(id, "unknown block id; treating as air");
                }
                &AIR_DEF
            }
        }
    }

    pub fn is_opaque(&self, id: BlockId) -> bool {
        self.get(id).is_opaque
    }

    pub fn is_solid(&self, id: BlockId) -> bool {
        self.get(id).is_solid
    }

    pub fn is_liquid(&self, id: BlockId) -> bool {
        self.get(id).is_liquid
    }

    /// Emitted block light for `id`, 0 when not an emitter.
    pub fn light_emission(&self, id: BlockId) -> u8 {
        self.get(id).light_level
    }

    /// Extra light attenuation for `id` beyond the per-step decay.
    pub fn light_blocking(&self, id: BlockId) -> u8 {
        self.get(id).light_blocking
    }

    /// Number of id slots (including gaps).
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Iterate registered definitions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &BlockDef> {
        self.defs.iter().filter_map(|slot| slot.as_ref())
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BLOCK_AIR;

    #[test]
    fn lookup_is_dense_and_total() {
        let registry = BlockRegistry::with_defaults();
        assert_eq!(registry.get(BLOCK_STONE).name, "stone");
        assert_eq!(registry.get(BLOCK_AIR).name, "air");
        // Unknown ids fall back to air.
        assert_eq!(registry.get(9999).name, "air");
        assert!(!registry.is_opaque(9999));
    }

    #[test]
    fn double_registration_replaces() {
        let mut registry = BlockRegistry::new();
        registry.register(BlockDef::solid(BLOCK_STONE, "stone", 1.5));
        registry.register(BlockDef::solid(BLOCK_STONE, "harder_stone", 3.0));
        assert_eq!(registry.get(BLOCK_STONE).name, "harder_stone");
        assert_eq!(registry.get(BLOCK_STONE).hardness, 3.0);
    }

    #[test]
    fn water_levels_are_liquid_non_solid() {
        let registry = BlockRegistry::with_defaults();
        for id in [BLOCK_WATER, BLOCK_WATER_3, BLOCK_WATER_2, BLOCK_WATER_1] {
            assert!(registry.is_liquid(id));
            assert!(!registry.is_solid(id));
            assert!(!registry.is_opaque(id));
        }
    }

    #[test]
    fn torch_emits_light() {
        let registry = BlockRegistry::with_defaults();
        assert_eq!(registry.light_emission(BLOCK_TORCH), 14);
        assert_eq!(registry.light_blocking(BLOCK_TORCH), 0);
        assert!(!registry.is_opaque(BLOCK_TORCH));
    }

    #[test]
    fn opaque_blocks_fully_block_light() {
        let registry = BlockRegistry::with_defaults();
        assert_eq!(registry.light_blocking(BLOCK_STONE), 15);
        assert_eq!(registry.light_blocking(BLOCK_WATER), 1);
    }
}
