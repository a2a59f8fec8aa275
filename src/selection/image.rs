//! Image selection and the category→image table

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::Serialize;

use super::least_used;
use crate::models::ImageAsset;
use crate::storage::SharedPoolRepository;

/// Built-in content category → image filenames
const DEFAULT_CATEGORY_IMAGES: &[(&str, &[&str])] = &[
    (
        "cars",
        &[
            "cars_and_trucks.png",
            "brake_parts.png",
            "engine_block.png",
            "tires_and_wheels.png",
            "car_battery.png",
            "exhaust_system.png",
            "suspension_parts.png",
        ],
    ),
    ("trucks", &["cars_and_trucks.png", "suspension_parts.png", "diesel_commercial_truck.png"]),
    ("diy", &["engine_block.png", "brake_parts.png", "car_battery.png"]),
    ("marine", &["boat_marine.png", "marine_parts.png"]),
    ("atv", &["atv_and_utv.png"]),
    ("rv", &["rv_trailer.png"]),
    ("small-engines", &["small_engines_equipment.png"]),
    ("generator", &["generator_power.png"]),
    ("tractor", &["hatch_garagebot_all_vehicles.png"]),
    ("heavy-equipment", &["hatch_garagebot_right_part.png"]),
    ("drones", &["drones_fpv.png"]),
    ("rc-cars", &["rc_hobby_vehicles.png"]),
    ("model-aircraft", &["model_aircraft.png"]),
    ("slot-cars", &["slot_cars.png"]),
    ("go-kart", &["go_kart_racing.png"]),
    ("golf-cart", &["golf_cart.png"]),
    ("snowmobile", &["snowmobile_snow.png"]),
    ("jet-ski", &["jet_ski_watercraft.png"]),
    ("exotic", &["exotic_supercar.png"]),
    ("classic", &["classic_hot_rod.png"]),
    ("diesel", &["diesel_commercial_truck.png"]),
    ("kit-car", &["kit_car_build.png"]),
    ("aviation", &["aviation_aircraft.png"]),
    ("motorcycle", &["motorcycle.png"]),
    ("ai", &["buddy_ai_assistant.png"]),
    ("brand", &["hatch_garagebot_all_vehicles.png", "hatch_garagebot_right_part.png"]),
];

/// Explicit mapping from content category to eligible image filenames
///
/// Categories without an entry draw from the whole active image pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryImageMap {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl Default for CategoryImageMap {
    fn default() -> Self {
        let mut map = Self::empty();
        for (category, files) in DEFAULT_CATEGORY_IMAGES {
            map.insert(*category, files.iter().copied());
        }
        map
    }
}

impl CategoryImageMap {
    /// Table with no entries
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Layer config entries over this table
    ///
    /// A listed category replaces the built-in set; an empty list removes it.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, Vec<String>>) -> Self {
        for (category, files) in overrides {
            if files.is_empty() {
                self.entries.remove(category);
            } else {
                self.entries
                    .insert(category.clone(), files.iter().cloned().collect());
            }
        }
        self
    }

    pub fn insert<I, S>(&mut self, category: impl Into<String>, files: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .insert(category.into(), files.into_iter().map(Into::into).collect());
    }

    /// Filenames mapped to a category
    pub fn filenames(&self, category: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(category)
    }

    /// Categories with an entry, sorted
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pick the next image from a pool snapshot
///
/// A mapped category restricts candidates to its filenames even when none of
/// them is active; an unmapped or absent category uses the whole pool.
pub fn select_image<'a>(
    pool: &'a [ImageAsset],
    table: &CategoryImageMap,
    category: Option<&str>,
) -> Option<&'a ImageAsset> {
    let allowed = category.and_then(|c| table.filenames(c));

    least_used(
        pool.iter()
            .filter(|image| image.is_active)
            .filter(|image| allowed.map_or(true, |files| files.contains(&image.filename))),
    )
}

/// Image selector over the pool repository
#[derive(Clone)]
pub struct ImageSelector {
    pool: SharedPoolRepository,
    table: CategoryImageMap,
}

impl ImageSelector {
    pub fn new(pool: SharedPoolRepository, table: CategoryImageMap) -> Self {
        Self { pool, table }
    }

    pub fn table(&self) -> &CategoryImageMap {
        &self.table
    }

    /// Next image for a content category, or None when no candidate exists
    pub fn select(&self, category: Option<&str>) -> Result<Option<ImageAsset>> {
        let pool = self.pool.active_images()?;
        let picked = select_image(&pool, &self.table, category).cloned();

        match &picked {
            Some(image) => tracing::debug!(
                filename = %image.filename,
                usage = image.usage_count,
                category = ?category,
                "Image selected"
            ),
            None => tracing::debug!(category = ?category, "No eligible image"),
        }

        Ok(picked)
    }
}
