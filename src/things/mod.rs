//! In-memory "things" domain
//!
//! A small store of dimmable things plus the actions that drive it. The store
//! doubles as the [`EntityRepository`] behind `{type: "thing", uuid}`
//! parameters. The binaries serve these actions; tests use them as a
//! realistic registry.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::runtime::access::{AccessDecision, Caller, CapabilityRule, Operation};
use crate::runtime::action::{Action, ActionContext, ActionHandler, ParameterDef};
use crate::runtime::cache::CacheabilityMetadata;
use crate::runtime::error::{ActionResult, RegistrationResult, RepositoryError, RpcError};
use crate::runtime::factory::{ENTITY, PAGINATION};
use crate::runtime::object::{ParamId, ParameterBag};
use crate::runtime::registry::ActionCatalog;
use crate::runtime::repository::{Entity, EntityRepository};
use crate::runtime::{Runtime, RuntimeConfig};

/// Entity type served by [`ThingStore`].
pub const THING_TYPE: &str = "thing";

/// Permission required to change things.
pub const ADMINISTER: &str = "administer things";

/// Permission that allows renaming without full administration.
pub const RENAME: &str = "rename things";

/// Cache tag invalidated whenever the set of things changes.
pub const LIST_TAG: &str = "thing_list";

const DEFAULT_PAGE: usize = 50;

/// A dimmable thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thing {
    /// Identifier
    pub uuid: Uuid,
    /// Display title
    pub title: String,
    /// Brightness, 0-100
    pub brightness: u8,
    /// Whether the thing is powered
    pub on: bool,
}

impl Thing {
    fn to_entity(&self) -> Entity {
        let attributes = serde_json::to_value(self).unwrap_or(Value::Null);
        Entity::new(THING_TYPE, self.uuid, attributes)
    }
}

/// Thread-safe in-memory store of things.
#[derive(Debug, Default)]
pub struct ThingStore {
    things: RwLock<BTreeMap<Uuid, Thing>>,
}

impl ThingStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a few things.
    pub fn with_samples() -> Self {
        let store = Self::new();
        for title in ["Desk lamp", "Hallway", "Porch"] {
            store.insert(title);
        }
        store
    }

    /// Add a thing, switched off at full brightness.
    pub fn insert(&self, title: impl Into<String>) -> Uuid {
        let uuid = Uuid::new_v4();
        let thing = Thing {
            uuid,
            title: title.into(),
            brightness: 100,
            on: false,
        };
        self.things.write().insert(uuid, thing);
        uuid
    }

    /// Fetch a thing.
    pub fn get(&self, uuid: &Uuid) -> Option<Thing> {
        self.things.read().get(uuid).cloned()
    }

    /// All things, ordered by uuid.
    pub fn list(&self) -> Vec<Thing> {
        self.things.read().values().cloned().collect()
    }

    /// Number of things.
    pub fn len(&self) -> usize {
        self.things.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.things.read().is_empty()
    }

    /// Apply `change` to a stored thing and return the updated copy.
    pub fn update<F>(&self, uuid: &Uuid, change: F) -> Option<Thing>
    where
        F: FnOnce(&mut Thing),
    {
        let mut things = self.things.write();
        let thing = things.get_mut(uuid)?;
        change(thing);
        Some(thing.clone())
    }
}

impl EntityRepository for ThingStore {
    fn load_by_type_and_id(
        &self,
        entity_type: &str,
        uuid: &Uuid,
    ) -> Result<Option<Entity>, RepositoryError> {
        if entity_type != THING_TYPE {
            return Err(RepositoryError::UnsupportedType(entity_type.to_string()));
        }
        Ok(self.get(uuid).map(|thing| thing.to_entity()))
    }
}

fn thing_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "uuid": {"type": "string"},
            "title": {"type": "string"},
            "brightness": {"type": "integer", "minimum": 0, "maximum": 100},
            "on": {"type": "boolean"}
        },
        "required": ["uuid", "title", "brightness", "on"]
    })
}

fn level_schema() -> Value {
    json!({"type": "integer", "minimum": 0, "maximum": 100})
}

/// Register the things actions on `catalog`.
pub fn register_actions(catalog: &ActionCatalog, store: Arc<ThingStore>) -> RegistrationResult<()> {
    catalog.register(
        Action::builder("ping")
            .title("Ping")
            .description("Liveness check.")
            .result_schema(json!({"type": "string"}))
            .handler_fn(|_, _| Ok(json!("pong")))
            .build()?,
    )?;

    let list_store = store.clone();
    catalog.register(
        Action::builder("things.list")
            .title("List things")
            .semantic_type("SearchAction")
            .parameter(
                ParameterDef::named("page")
                    .with_factory(PAGINATION)
                    .with_description("Offset and limit; at most 50 things by default"),
            )
            .result_schema(json!({"type": "array", "items": thing_schema()}))
            .handler_fn(move |params, context| {
                context.add_cacheability(&CacheabilityMetadata::default().with_tag(LIST_TAG));
                let page = params.pagination("page").copied().unwrap_or_default();
                let things: Vec<_> = page.apply(list_store.list().into_iter(), DEFAULT_PAGE).collect();
                Ok(serde_json::to_value(things).map_err(anyhow::Error::from)?)
            })
            .build()?,
    )?;

    let brightness_store = store.clone();
    catalog.register(
        Action::builder("thing.setBrightness")
            .title("Set brightness")
            .semantic_type("UpdateAction")
            .permission(ADMINISTER)
            .parameter(
                ParameterDef::named("thing")
                    .with_factory(ENTITY)
                    .with_description("The thing to dim")
                    .required(),
            )
            .parameter(
                ParameterDef::named("level")
                    .with_schema(level_schema())
                    .with_description("Brightness, 0-100")
                    .required(),
            )
            .result_schema(thing_schema())
            .handler_fn(move |params, context| {
                let level = json_u8(params, "level")?;
                update_thing(&brightness_store, params, "thing", context, |thing| {
                    thing.brightness = level;
                    thing.on = level > 0;
                })
            })
            .build()?,
    )?;

    let fade_store = store.clone();
    catalog.register(
        Action::builder("thing.fade")
            .title("Fade")
            .description("Positional form: [thing, level, duration_ms].")
            .permission(ADMINISTER)
            .positional()
            .parameter(ParameterDef::positional(0).with_factory(ENTITY).required())
            .parameter(ParameterDef::positional(1).with_schema(level_schema()).required())
            .parameter(
                ParameterDef::positional(2)
                    .with_schema(json!({"type": "integer", "minimum": 0}))
                    .with_description("Fade duration in milliseconds"),
            )
            .result_schema(json!({
                "type": "object",
                "properties": {
                    "thing": thing_schema(),
                    "duration_ms": {"type": "integer"}
                }
            }))
            .handler_fn(move |params, context| {
                let level = json_u8(params, 1usize)?;
                let duration = params
                    .json(2usize)
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                let thing = update_thing(&fade_store, params, 0usize, context, |thing| {
                    thing.brightness = level;
                    thing.on = level > 0;
                })?;
                Ok(json!({"thing": thing, "duration_ms": duration}))
            })
            .build()?,
    )?;

    catalog.register(
        Action::builder("thing.identify")
            .title("Identify")
            .description("Blink the thing. Notification only; produces no result.")
            .parameter(ParameterDef::named("thing").with_factory(ENTITY).required())
            .handler_fn(|params, context| {
                if let Some(entity) = params.entity("thing") {
                    info!(thing = %entity.uuid, caller = %context.caller.name(), "identify");
                }
                Ok(Value::Null)
            })
            .build()?,
    )?;

    let rename_store = store.clone();
    catalog.register(
        Action::builder("thing.rename")
            .title("Rename")
            .capability(CapabilityRule::predicate(rename_access))
            .parameter(ParameterDef::named("thing").with_factory(ENTITY).required())
            .parameter(
                ParameterDef::named("title")
                    .with_schema(json!({"type": "string", "minLength": 1}))
                    .required(),
            )
            .result_schema(thing_schema())
            .handler_fn(move |params, context| {
                let title = params
                    .json("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                update_thing(&rename_store, params, "thing", context, |thing| {
                    thing.title = title;
                })
            })
            .build()?,
    )?;

    let power = Arc::new(PowerSwitch { store });
    for (id, entry_point, title) in [
        ("thing.turnOn", "turn_on", "Turn on"),
        ("thing.turnOff", "turn_off", "Turn off"),
    ] {
        catalog.register(
            Action::builder(id)
                .title(title)
                .permission(ADMINISTER)
                .entry_point(entry_point)
                .parameter(ParameterDef::named("thing").with_factory(ENTITY).required())
                .result_schema(thing_schema())
                .handler(power.clone())
                .build()?,
        )?;
    }

    Ok(())
}

/// Build a runtime serving the things actions over a sample store.
pub fn sample_runtime(config: RuntimeConfig) -> RegistrationResult<(Runtime, Arc<ThingStore>)> {
    let store = Arc::new(ThingStore::with_samples());
    let catalog = ActionCatalog::new();
    register_actions(&catalog, store.clone())?;
    let runtime = Runtime::new(config, catalog.snapshot(), store.clone());
    Ok((runtime, store))
}

/// Renaming is open to administrators and to holders of the rename permission.
fn rename_access(operation: &Operation, caller: &dyn Caller) -> AccessDecision {
    match operation {
        Operation::Execute | Operation::View => {
            let admin = AccessDecision::allowed_if_has_permission(caller, ADMINISTER);
            if admin.is_allowed() {
                admin
            } else {
                AccessDecision::allowed_if_has_permission(caller, RENAME)
            }
        }
        Operation::Other(_) => AccessDecision::neutral(None),
    }
}

/// One handler, two entry points.
struct PowerSwitch {
    store: Arc<ThingStore>,
}

impl ActionHandler for PowerSwitch {
    fn execute(&self, params: &ParameterBag, context: &ActionContext<'_>) -> ActionResult<Value> {
        self.call("turn_on", params, context)
    }

    fn call(
        &self,
        entry_point: &str,
        params: &ParameterBag,
        context: &ActionContext<'_>,
    ) -> ActionResult<Value> {
        let on = match entry_point {
            "turn_on" => true,
            "turn_off" => false,
            other => {
                return Err(anyhow::anyhow!("power switch has no entry point '{other}'").into());
            }
        };
        update_thing(&self.store, params, "thing", context, |thing| thing.on = on)
    }
}

fn json_u8(params: &ParameterBag, id: impl Into<ParamId>) -> ActionResult<u8> {
    let id = id.into();
    params
        .json(id.clone())
        .and_then(Value::as_u64)
        .and_then(|level| u8::try_from(level).ok())
        .ok_or_else(|| RpcError::invalid_params(format!("Missing required parameter: {id}")).into())
}

fn update_thing<F>(
    store: &ThingStore,
    params: &ParameterBag,
    param: impl Into<ParamId>,
    context: &ActionContext<'_>,
    change: F,
) -> ActionResult<Value>
where
    F: FnOnce(&mut Thing),
{
    let entity = params
        .entity(param)
        .ok_or_else(|| RpcError::invalid_params("The requested entity could not be found."))?;
    context.add_cacheability(&CacheabilityMetadata::default().with_tag(entity.cache_tag()));

    let thing = store
        .update(&entity.uuid, change)
        .ok_or_else(|| RpcError::invalid_params("The requested entity could not be found."))?;
    Ok(serde_json::to_value(thing).map_err(anyhow::Error::from)?)
}
