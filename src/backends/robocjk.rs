//! Deep-component glyphs stored in a remote robocjk database
//!
//! The database is reached through a [`RoboCjkApi`] implementation supplied
//! by the caller. Glyph records are fetched with their layers and the full
//! tree of glyphs they are made of, and kept for a short while in a
//! per-backend cache so that a burst of requests for related glyphs costs
//! one round trip each.
mod api;
mod cache;
mod resolver;

pub use api::{GlyphCategory, GlyphInfo, GlyphRecord, LayerRecord, RoboCjkApi};
pub use cache::DEFAULT_CACHE_TIMEOUT;

use crate::{
    axis::{Axis, RawAxis},
    backend::{GlyphMap, ReadableFontBackend},
    glyph::VariableGlyph,
    variation::assemble_deep_glyph,
    StoreError,
};
use cache::{CacheKey, CachedGlyph, GlyphCache};
use std::{collections::HashMap, sync::Arc, time::Duration};

/// A read-only backend on top of a robocjk database
#[derive(Debug)]
pub struct RoboCjkBackend<C: RoboCjkApi> {
    client: C,
    font_uid: String,
    glyph_mapping: HashMap<String, CacheKey>,
    cache: GlyphCache,
}

impl<C: RoboCjkApi> RoboCjkBackend<C> {
    /// Use `client` to reach the font identified by `font_uid`
    pub fn new(client: C, font_uid: impl Into<String>) -> Self {
        RoboCjkBackend {
            client,
            font_uid: font_uid.into(),
            glyph_mapping: HashMap::new(),
            cache: GlyphCache::new(DEFAULT_CACHE_TIMEOUT),
        }
    }

    /// Keep fetched glyphs for `timeout` after the most recent fetch
    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache.set_timeout(timeout);
        self
    }

    /// The API client
    pub fn client(&self) -> &C {
        &self.client
    }

    async fn fetch(&mut self, key: CacheKey) -> Result<CachedGlyph, StoreError> {
        if let Some(cached) = self.cache.get(&key) {
            log::debug!("Serving glyph {:?} from cache", key);
            return Ok(cached);
        }
        let (category, id) = key;
        let record = api::get_glyph(&self.client, &self.font_uid, category, id).await?;
        self.cache_base_glyphs(&record.made_of)?;
        let cached = CachedGlyph {
            record: Arc::new(record),
            axis_defaults: None,
        };
        self.cache.insert(key, cached.clone());
        Ok(cached)
    }

    // Related records arrive with every fetch; keep them so that asking for
    // one of them next does not go back to the server.
    fn cache_base_glyphs(&self, made_of: &[GlyphRecord]) -> Result<(), StoreError> {
        for record in made_of {
            let expected = record.type_code.map(|category| (category, record.id));
            let key = match self.glyph_mapping.get(&record.name) {
                Some(key) if Some(*key) == expected => *key,
                listed => {
                    return Err(StoreError::RemoteTransport(format!(
                        "related glyph {} ({:?} {}) does not match the glyph list entry {:?}",
                        record.name, record.type_code, record.id, listed
                    )))
                }
            };
            self.cache_base_glyphs(&record.made_of)?;
            if self.cache.get(&key).is_none() {
                self.cache.insert(
                    key,
                    CachedGlyph {
                        record: Arc::new(record.clone()),
                        axis_defaults: None,
                    },
                );
            }
        }
        Ok(())
    }
}

impl<C: RoboCjkApi> ReadableFontBackend for RoboCjkBackend<C> {
    async fn get_glyph_map(&mut self) -> Result<GlyphMap, StoreError> {
        let mut glyph_map = GlyphMap::new();
        let mut mapping = HashMap::new();
        for category in GlyphCategory::ALL {
            for info in api::list_glyphs(&self.client, &self.font_uid, category).await? {
                glyph_map.insert(info.name.clone(), info.codepoints()?);
                mapping.insert(info.name, (category, info.id));
            }
        }
        log::info!(
            "Listed {} glyphs from font {}",
            glyph_map.len(),
            self.font_uid
        );
        self.glyph_mapping = mapping;
        Ok(glyph_map)
    }

    async fn get_glyph(&mut self, name: &str) -> Result<VariableGlyph, StoreError> {
        if self.glyph_mapping.is_empty() {
            self.get_glyph_map().await?;
        }
        let key = *self
            .glyph_mapping
            .get(name)
            .ok_or_else(|| StoreError::GlyphNotFound {
                glyph: name.to_string(),
            })?;
        let cached = self.fetch(key).await?;
        let axis_defaults = match cached.axis_defaults {
            Some(defaults) => defaults,
            None => {
                let defaults = Arc::new(resolver::resolve_axis_defaults(&cached.record.made_of)?);
                self.cache.set_axis_defaults(&key, defaults.clone());
                defaults
            }
        };
        self.cache.schedule_purge();
        let layers: HashMap<String, String> = cached
            .record
            .layers
            .iter()
            .map(|layer| (layer.group_name.clone(), layer.data.clone()))
            .collect();
        assemble_deep_glyph(&cached.record.data, &layers, &axis_defaults)
    }

    async fn get_global_axes(&self) -> Result<Vec<Axis>, StoreError> {
        let font = api::get_font(&self.client, &self.font_uid).await?;
        let Some(axes) = font.pointer("/designspace/axes") else {
            return Ok(vec![]);
        };
        let raw: Vec<RawAxis> = serde_json::from_value(axes.clone())?;
        Ok(raw.into_iter().map(RawAxis::normalize_tagged).collect())
    }

    async fn get_font_lib(&self) -> Result<serde_json::Value, StoreError> {
        Ok(serde_json::Value::Object(Default::default()))
    }

    fn close(&mut self) {
        self.cache.clear();
    }
}
