use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::camera::Camera;
use super::input::{InputTracker, Key};
use super::rendering::{world_rect_to_screen, Rgba, Surface};
use super::{EntityId, Vec2};

pub const ENTITY_SIZE_WORLD: Vec2 = Vec2::new(32.0, 32.0);
pub const ENTITY_COLOR: Rgba = [0, 255, 0, 255];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpawnError {
    #[error("unknown entity kind '{kind}'; known kinds: dummy, player")]
    UnknownEntityKind { kind: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HookError {
    #[error("position became non-finite ({x}, {y})")]
    NonFinitePosition { x: f32, y: f32 },
    #[error("world rectangle at ({x}, {y}) does not project to a finite screen rectangle")]
    NonFiniteProjection { x: f32, y: f32 },
    #[error("hook panicked: {message}")]
    Panicked { message: String },
}

/// Runs one hook, turning a panic into [`HookError::Panicked`] so the rest of
/// the pass still runs.
pub(crate) fn guard_hook(hook: impl FnOnce() -> Result<(), HookError>) -> Result<(), HookError> {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(text) = payload.downcast_ref::<&str>() {
                (*text).to_string()
            } else if let Some(text) = payload.downcast_ref::<String>() {
                text.clone()
            } else {
                "non-string panic payload".to_string()
            };
            Err(HookError::Panicked { message })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultSource {
    Entity { id: EntityId, kind: EntityKind },
    Block { index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HookFault {
    pub source: FaultSource,
    pub error: HookError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Dummy,
    Player,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Dummy, EntityKind::Player];

    pub const fn name(self) -> &'static str {
        match self {
            EntityKind::Dummy => "dummy",
            EntityKind::Player => "player",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = SpawnError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.name() == raw)
            .ok_or_else(|| SpawnError::UnknownEntityKind {
                kind: raw.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerTuning {
    pub acceleration: f32,
    pub max_speed: f32,
    pub friction: f32,
}

impl Default for PlayerTuning {
    fn default() -> Self {
        Self {
            acceleration: 1.0,
            max_speed: 4.0,
            friction: 1.0,
        }
    }
}

impl PlayerTuning {
    fn sanitized(self) -> Self {
        let defaults = Self::default();
        let pick = |value: f32, fallback: f32| {
            if value.is_finite() && value >= 0.0 {
                value
            } else {
                fallback
            }
        };
        Self {
            acceleration: pick(self.acceleration, defaults.acceleration),
            max_speed: pick(self.max_speed, defaults.max_speed),
            friction: pick(self.friction, defaults.friction),
        }
    }
}

/// Identity and placement shared by every kind. Hooks get this alongside their
/// own kind state so both can be borrowed mutably at once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityCore {
    pub id: EntityId,
    pub position: Vec2,
}

pub struct CreateContext<'a> {
    pub camera: &'a mut Camera,
}

pub trait EntityBehavior {
    fn on_create(&mut self, core: &mut EntityCore, ctx: &mut CreateContext<'_>);
    fn on_step(&mut self, core: &mut EntityCore, input: &InputTracker) -> Result<(), HookError>;
    fn on_draw(
        &self,
        core: &EntityCore,
        camera: &Camera,
        surface: &mut dyn Surface,
    ) -> Result<(), HookError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Dummy;

impl EntityBehavior for Dummy {
    fn on_create(&mut self, _core: &mut EntityCore, _ctx: &mut CreateContext<'_>) {}

    fn on_step(&mut self, _core: &mut EntityCore, _input: &InputTracker) -> Result<(), HookError> {
        Ok(())
    }

    fn on_draw(
        &self,
        core: &EntityCore,
        camera: &Camera,
        surface: &mut dyn Surface,
    ) -> Result<(), HookError> {
        draw_placeholder(core, camera, surface)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Player {
    pub speed: Vec2,
    pub tuning: PlayerTuning,
}

impl Player {
    fn new(tuning: PlayerTuning) -> Self {
        Self {
            speed: Vec2::default(),
            tuning: tuning.sanitized(),
        }
    }
}

impl EntityBehavior for Player {
    fn on_create(&mut self, core: &mut EntityCore, ctx: &mut CreateContext<'_>) {
        self.speed = Vec2::default();
        ctx.camera.set_subject(Some(core.id));
    }

    fn on_step(&mut self, core: &mut EntityCore, input: &InputTracker) -> Result<(), HookError> {
        let intent_x = axis_intent(
            input.is_held(Key::Char('d')),
            input.is_held(Key::Char('a')),
        );
        let intent_y = axis_intent(
            input.is_held(Key::Char('s')),
            input.is_held(Key::Char('w')),
        );

        self.speed.x = step_axis_speed(self.speed.x, intent_x, &self.tuning);
        self.speed.y = step_axis_speed(self.speed.y, intent_y, &self.tuning);
        core.position.x += self.speed.x;
        core.position.y += self.speed.y;

        if !core.position.is_finite() {
            return Err(HookError::NonFinitePosition {
                x: core.position.x,
                y: core.position.y,
            });
        }
        Ok(())
    }

    fn on_draw(
        &self,
        core: &EntityCore,
        camera: &Camera,
        surface: &mut dyn Surface,
    ) -> Result<(), HookError> {
        draw_placeholder(core, camera, surface)
    }
}

fn axis_intent(positive: bool, negative: bool) -> f32 {
    f32::from(u8::from(positive)) - f32::from(u8::from(negative))
}

fn step_axis_speed(speed: f32, intent: f32, tuning: &PlayerTuning) -> f32 {
    let mut speed = speed;
    if intent == 0.0 {
        speed = approach_zero(speed, tuning.friction);
    }
    speed += tuning.acceleration * intent;
    speed.clamp(-tuning.max_speed, tuning.max_speed)
}

fn approach_zero(value: f32, amount: f32) -> f32 {
    if value < 0.0 {
        (value + amount).min(0.0)
    } else if value > 0.0 {
        (value - amount).max(0.0)
    } else {
        value
    }
}

fn draw_placeholder(
    core: &EntityCore,
    camera: &Camera,
    surface: &mut dyn Surface,
) -> Result<(), HookError> {
    let rect = world_rect_to_screen(camera, core.position, ENTITY_SIZE_WORLD).ok_or(
        HookError::NonFiniteProjection {
            x: core.position.x,
            y: core.position.y,
        },
    )?;
    surface.fill_rect(rect, ENTITY_COLOR);
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityBody {
    Dummy(Dummy),
    Player(Player),
}

impl EntityBody {
    fn for_kind(kind: EntityKind, tuning: PlayerTuning) -> Self {
        match kind {
            EntityKind::Dummy => EntityBody::Dummy(Dummy),
            EntityKind::Player => EntityBody::Player(Player::new(tuning)),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityBody::Dummy(_) => EntityKind::Dummy,
            EntityBody::Player(_) => EntityKind::Player,
        }
    }
}

impl EntityBehavior for EntityBody {
    fn on_create(&mut self, core: &mut EntityCore, ctx: &mut CreateContext<'_>) {
        match self {
            EntityBody::Dummy(dummy) => dummy.on_create(core, ctx),
            EntityBody::Player(player) => player.on_create(core, ctx),
        }
    }

    fn on_step(&mut self, core: &mut EntityCore, input: &InputTracker) -> Result<(), HookError> {
        match self {
            EntityBody::Dummy(dummy) => dummy.on_step(core, input),
            EntityBody::Player(player) => player.on_step(core, input),
        }
    }

    fn on_draw(
        &self,
        core: &EntityCore,
        camera: &Camera,
        surface: &mut dyn Surface,
    ) -> Result<(), HookError> {
        match self {
            EntityBody::Dummy(dummy) => dummy.on_draw(core, camera, surface),
            EntityBody::Player(player) => player.on_draw(core, camera, surface),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    core: EntityCore,
    body: EntityBody,
}

impl Entity {
    pub fn id(&self) -> EntityId {
        self.core.id
    }

    pub fn kind(&self) -> EntityKind {
        self.body.kind()
    }

    pub fn position(&self) -> Vec2 {
        self.core.position
    }

    pub fn body(&self) -> &EntityBody {
        &self.body
    }

    fn fault(&self, error: HookError) -> HookFault {
        HookFault {
            source: FaultSource::Entity {
                id: self.id(),
                kind: self.kind(),
            },
            error,
        }
    }
}

#[derive(Debug)]
pub struct EntityRegistry {
    entities: Vec<Entity>,
    next_entity_id: u64,
    player_tuning: PlayerTuning,
    // Interior mutability lets the draw pass (which only borrows the world)
    // still remember which entities it already warned about.
    reported_faults: RefCell<HashSet<EntityId>>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new(PlayerTuning::default())
    }
}

impl EntityRegistry {
    pub fn new(player_tuning: PlayerTuning) -> Self {
        Self {
            entities: Vec::new(),
            next_entity_id: 0,
            player_tuning,
            reported_faults: RefCell::new(HashSet::new()),
        }
    }

    pub fn spawn(
        &mut self,
        kind: &str,
        x: f32,
        y: f32,
        camera: &mut Camera,
    ) -> Result<&Entity, SpawnError> {
        let kind = kind.parse::<EntityKind>()?;
        Ok(self.spawn_kind(kind, x, y, camera))
    }

    pub fn spawn_kind(&mut self, kind: EntityKind, x: f32, y: f32, camera: &mut Camera) -> &Entity {
        let id = EntityId(self.next_entity_id);
        self.next_entity_id = self.next_entity_id.saturating_add(1);

        let mut core = EntityCore {
            id,
            position: Vec2 { x, y },
        };
        let mut body = EntityBody::for_kind(kind, self.player_tuning);
        body.on_create(&mut core, &mut CreateContext { camera });
        debug!(entity_id = id.0, kind = kind.name(), x, y, "entity_spawned");

        let index = self.entities.len();
        self.entities.push(Entity { core, body });
        &self.entities[index]
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id() == id)
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn step_all(&mut self, input: &InputTracker) -> Vec<HookFault> {
        let mut faults = Vec::new();
        for entity in &mut self.entities {
            let Entity { core, body } = entity;
            if let Err(error) = guard_hook(|| body.on_step(core, input)) {
                faults.push(entity.fault(error));
            }
        }
        self.report_faults("step", &faults);
        faults
    }

    pub fn draw_all(&self, camera: &Camera, surface: &mut dyn Surface) -> Vec<HookFault> {
        let mut faults = Vec::new();
        for entity in &self.entities {
            let drawn = guard_hook(|| entity.body.on_draw(&entity.core, camera, &mut *surface));
            if let Err(error) = drawn {
                faults.push(entity.fault(error));
            }
        }
        self.report_faults("draw", &faults);
        faults
    }

    fn report_faults(&self, pass: &'static str, faults: &[HookFault]) {
        let mut reported = self.reported_faults.borrow_mut();
        for fault in faults {
            let FaultSource::Entity { id, kind } = fault.source else {
                continue;
            };
            if reported.insert(id) {
                warn!(
                    pass,
                    entity_id = id.0,
                    kind = kind.name(),
                    error = %fault.error,
                    "entity_hook_failed"
                );
            } else {
                debug!(
                    pass,
                    entity_id = id.0,
                    kind = kind.name(),
                    error = %fault.error,
                    "entity_hook_failed_again"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::rendering::{DrawCall, PanicOnceSurface, RecordingSurface};
    use crate::app::Viewport;

    fn input() -> InputTracker {
        InputTracker::new(Viewport::default())
    }

    fn player_speed(entity: &Entity) -> Vec2 {
        match entity.body() {
            EntityBody::Player(player) => player.speed,
            EntityBody::Dummy(_) => panic!("expected player"),
        }
    }

    #[test]
    fn kind_names_round_trip_through_parse() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.name().parse::<EntityKind>(), Ok(kind));
        }
    }

    #[test]
    fn unknown_kind_fails_and_does_not_append() {
        let mut registry = EntityRegistry::default();
        let mut camera = Camera::default();

        let result = registry.spawn("unknown_kind", 0.0, 0.0, &mut camera);

        assert_eq!(
            result.map(Entity::id),
            Err(SpawnError::UnknownEntityKind {
                kind: "unknown_kind".to_string()
            })
        );
        assert!(registry.is_empty());
        assert_eq!(camera.subject(), None);
    }

    #[test]
    fn spawn_preserves_insertion_order_and_unique_ids() {
        let mut registry = EntityRegistry::default();
        let mut camera = Camera::default();
        let a = registry.spawn("dummy", 1.0, 2.0, &mut camera).expect("a").id();
        let b = registry.spawn("player", 3.0, 4.0, &mut camera).expect("b").id();
        let c = registry.spawn("dummy", 5.0, 6.0, &mut camera).expect("c").id();

        let ids = registry.entities().iter().map(Entity::id).collect::<Vec<_>>();
        assert_eq!(ids, vec![a, b, c]);
        assert_eq!(camera.subject(), Some(b));
    }

    #[test]
    fn player_accelerates_by_one_increment_per_tick() {
        let mut registry = EntityRegistry::default();
        let mut camera = Camera::default();
        registry.spawn("player", 0.0, 0.0, &mut camera).expect("player");
        let mut input = input();
        input.on_key_down(Key::Char('d'));

        registry.step_all(&input);
        input.consolidate();

        let player = &registry.entities()[0];
        assert_eq!(player_speed(player), Vec2::new(1.0, 0.0));
        assert_eq!(player.position(), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn player_speed_is_clamped_to_max() {
        let mut registry = EntityRegistry::default();
        let mut camera = Camera::default();
        registry.spawn("player", 0.0, 0.0, &mut camera).expect("player");
        let mut input = input();
        input.on_key_down(Key::Char('w'));

        for _ in 0..10 {
            registry.step_all(&input);
            input.consolidate();
        }

        let player = &registry.entities()[0];
        assert_eq!(player_speed(player), Vec2::new(0.0, -4.0));
        // 1 + 2 + 3 + 4 * 7
        assert_eq!(player.position(), Vec2::new(0.0, -34.0));
    }

    #[test]
    fn player_speed_decays_by_friction_without_intent() {
        let mut registry = EntityRegistry::new(PlayerTuning {
            acceleration: 2.0,
            max_speed: 10.0,
            friction: 1.5,
        });
        let mut camera = Camera::default();
        registry.spawn("player", 0.0, 0.0, &mut camera).expect("player");
        let mut input = input();
        input.on_key_down(Key::Char('d'));
        registry.step_all(&input);
        registry.step_all(&input);
        input.on_key_up(Key::Char('d'));
        input.consolidate();

        registry.step_all(&input);
        assert_eq!(player_speed(&registry.entities()[0]).x, 2.5);
        registry.step_all(&input);
        registry.step_all(&input);
        assert_eq!(player_speed(&registry.entities()[0]).x, 0.0);
    }

    #[test]
    fn opposing_keys_cancel() {
        let mut registry = EntityRegistry::default();
        let mut camera = Camera::default();
        registry.spawn("player", 0.0, 0.0, &mut camera).expect("player");
        let mut input = input();
        input.on_key_down(Key::Char('a'));
        input.on_key_down(Key::Char('d'));

        registry.step_all(&input);
        assert_eq!(registry.entities()[0].position(), Vec2::default());
    }

    #[test]
    fn step_fault_is_isolated_to_the_failing_entity() {
        let mut registry = EntityRegistry::default();
        let mut camera = Camera::default();
        let broken = registry
            .spawn("player", f32::NAN, 0.0, &mut camera)
            .expect("broken")
            .id();
        registry.spawn("player", 0.0, 0.0, &mut camera).expect("healthy");
        let mut input = input();
        input.on_key_down(Key::Char('d'));

        let faults = registry.step_all(&input);

        assert_eq!(faults.len(), 1);
        assert_eq!(
            faults[0].source,
            FaultSource::Entity {
                id: broken,
                kind: EntityKind::Player
            }
        );
        assert_eq!(registry.entities()[1].position(), Vec2::new(1.0, 0.0));

        // A repeat fault is still returned even though it is only warned once.
        assert_eq!(registry.step_all(&input).len(), 1);
    }

    #[test]
    fn draw_all_projects_in_insertion_order() {
        let mut registry = EntityRegistry::default();
        let mut camera = Camera::default();
        registry.spawn("dummy", 0.0, 0.0, &mut camera).expect("dummy");
        registry.spawn("dummy", 100.0, 0.0, &mut camera).expect("dummy");
        let mut surface = RecordingSurface::new(1280, 720);

        let faults = registry.draw_all(&camera, &mut surface);

        assert!(faults.is_empty());
        let xs = surface
            .calls()
            .iter()
            .filter_map(|call| match call {
                DrawCall::Fill { rect, color } if *color == ENTITY_COLOR => Some(rect.x),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(xs, vec![624, 724]);
    }

    #[test]
    fn draw_fault_does_not_skip_later_entities() {
        let mut registry = EntityRegistry::default();
        let mut camera = Camera::default();
        registry
            .spawn("dummy", f32::INFINITY, 0.0, &mut camera)
            .expect("broken");
        registry.spawn("dummy", 0.0, 0.0, &mut camera).expect("ok");
        let mut surface = RecordingSurface::new(1280, 720);

        let faults = registry.draw_all(&camera, &mut surface);

        assert_eq!(faults.len(), 1);
        assert_eq!(surface.calls().len(), 1);
    }

    #[test]
    fn panic_in_hook_becomes_hook_error() {
        let result = guard_hook(|| panic!("boom {}", 7));
        assert_eq!(
            result,
            Err(HookError::Panicked {
                message: "boom 7".to_string()
            })
        );
        assert_eq!(guard_hook(|| Ok(())), Ok(()));
    }

    #[test]
    fn panicking_draw_does_not_stop_later_entities() {
        let mut registry = EntityRegistry::default();
        let mut camera = Camera::default();
        let first = registry.spawn("dummy", 0.0, 0.0, &mut camera).expect("first").id();
        registry.spawn("dummy", 100.0, 0.0, &mut camera).expect("second");
        registry.spawn("player", 0.0, 0.0, &mut camera).expect("player");
        let mut surface = PanicOnceSurface::new(1280, 720);

        let faults = registry.draw_all(&camera, &mut surface);

        assert_eq!(faults.len(), 1);
        assert_eq!(
            faults[0].source,
            FaultSource::Entity {
                id: first,
                kind: EntityKind::Dummy
            }
        );
        assert!(matches!(faults[0].error, HookError::Panicked { .. }));
        assert!(surface
            .calls()
            .iter()
            .any(|call| matches!(call, DrawCall::Fill { rect, .. } if rect.x == 724)));

        let mut input = input();
        input.on_key_down(Key::Char('d'));
        assert!(registry.step_all(&input).is_empty());
        assert_eq!(registry.entities()[2].position(), Vec2::new(1.0, 0.0));
    }
}
