//! Static item and resource definitions, loaded once at startup.
//!
//! The catalog is immutable at runtime; the engine only ever needs
//! [`Catalog::resource`] and [`Catalog::item`] lookups.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// What kind of tile interactable a resource is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Resource,
    Workbench,
    Furnace,
    Magic,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Resource => "resource",
            ResourceKind::Workbench => "workbench",
            ResourceKind::Furnace => "furnace",
            ResourceKind::Magic => "magic",
        }
    }
}

/// An `(item, quantity)` pair in a reward list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQty {
    pub item_id: String,
    pub qty: u32,
}

/// An input a player must hold to complete an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredItem {
    pub item_id: String,
    pub qty: u32,
    /// Whether `qty` units are removed from inventory on use.
    #[serde(default)]
    pub consumed: bool,
    /// Durability drained from matching stacks on use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub durability_reduction: Option<u32>,
}

/// A collectable node definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDef {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub verb: String,
    /// Seconds from start to completion.
    pub collection_time: f64,
    #[serde(default)]
    pub reward_items: Vec<ItemQty>,
    #[serde(default)]
    pub required_items: Vec<RequiredItem>,
    #[serde(default)]
    pub limitless: bool,
    /// Collections available before a finite node is depleted.
    #[serde(default)]
    pub amount: u32,
    /// Seconds a depleted node stays gone; `None` uses the engine default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respawn_time: Option<u32>,
}

/// An inventory item definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDef {
    pub id: String,
    pub name: String,
    pub max_stack: u32,
    /// Durable items never stack and start at this durability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_durability: Option<u32>,
}

impl ItemDef {
    /// Stack limit after accounting for durability (durable items are singletons).
    pub fn effective_max_stack(&self) -> u32 {
        if self.max_durability.is_some() {
            1
        } else {
            self.max_stack
        }
    }
}

/// Initial resource placement on a tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub x: i32,
    pub y: i32,
    pub resource_id: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    items: Vec<ItemDef>,
    #[serde(default)]
    resources: Vec<ResourceDef>,
    #[serde(default)]
    placements: Vec<Placement>,
}

/// Validated, immutable lookup of items and resources.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: BTreeMap<String, ItemDef>,
    resources: BTreeMap<String, ResourceDef>,
    placements: Vec<Placement>,
}

impl Catalog {
    /// Build and validate a catalog from definitions.
    pub fn new(
        items: Vec<ItemDef>,
        resources: Vec<ResourceDef>,
        placements: Vec<Placement>,
    ) -> Result<Self, CatalogError> {
        let mut item_map = BTreeMap::new();
        for item in items {
            if item.max_stack == 0 {
                return Err(CatalogError::ZeroStack { item: item.id });
            }
            if item_map.contains_key(&item.id) {
                return Err(CatalogError::DuplicateId {
                    kind: "item",
                    id: item.id,
                });
            }
            item_map.insert(item.id.clone(), item);
        }

        let mut resource_map = BTreeMap::new();
        for res in resources {
            validate_resource(&res, &item_map)?;
            if resource_map.contains_key(&res.id) {
                return Err(CatalogError::DuplicateId {
                    kind: "resource",
                    id: res.id,
                });
            }
            resource_map.insert(res.id.clone(), res);
        }

        for p in &placements {
            if !resource_map.contains_key(&p.resource_id) {
                return Err(CatalogError::UnknownPlacement {
                    x: p.x,
                    y: p.y,
                    resource: p.resource_id.clone(),
                });
            }
        }

        Ok(Self {
            items: item_map,
            resources: resource_map,
            placements,
        })
    }

    /// Parse and validate the JSON catalog file.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.items, file.resources, file.placements)
    }

    pub fn resource(&self, id: &str) -> Option<&ResourceDef> {
        self.resources.get(id)
    }

    pub fn item(&self, id: &str) -> Option<&ItemDef> {
        self.items.get(id)
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceDef> {
        self.resources.values()
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemDef> {
        self.items.values()
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    /// Display name for an item, falling back to its id.
    pub fn item_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.items.get(id).map(|i| i.name.as_str()).unwrap_or(id)
    }
}

fn validate_resource(
    res: &ResourceDef,
    items: &BTreeMap<String, ItemDef>,
) -> Result<(), CatalogError> {
    if !res.limitless && res.amount == 0 {
        return Err(CatalogError::EmptyFiniteResource {
            resource: res.id.clone(),
        });
    }
    let rewards = res.reward_items.iter().map(|r| (&r.item_id, r.qty));
    let required = res.required_items.iter().map(|r| (&r.item_id, r.qty));
    for (item_id, qty) in rewards.chain(required) {
        if qty == 0 {
            return Err(CatalogError::ZeroQuantity {
                resource: res.id.clone(),
                item: item_id.clone(),
            });
        }
        if !items.contains_key(item_id) {
            return Err(CatalogError::UnknownItem {
                resource: res.id.clone(),
                item: item_id.clone(),
            });
        }
    }
    Ok(())
}
