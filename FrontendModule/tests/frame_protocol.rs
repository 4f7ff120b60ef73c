use std::cell::RefCell;
use std::net::TcpListener;
use std::rc::Rc;
use std::sync::Once;
use std::time::Duration;

use rigsync_frontend::sync::{Outstanding, SyncState};
use rigsync_frontend::Frontend;
use rigsync_shared::object::{ComponentDesc, EntityDesc};
use rigsync_shared::stream::direct_pair;
use rigsync_shared::*;
use rigsync_simulator::input::SimulatorEvent;
use rigsync_simulator::{SimulationLogic, Simulator, SimulatorContext};

static SET_LOGGER_ONCE: Once = Once::new();

fn init_logger() {
    SET_LOGGER_ONCE.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn config(topology: Topology) -> SyncConfig {
    SyncConfig { topology, ..Default::default() }
}

#[test]
fn at_most_one_request_is_outstanding() {
    init_logger();
    let (front, mut back) = direct_pair::<SimulatorRequest, SimulatorReply>();
    let mut frontend = Frontend::with_stream(SyncConfig::default(), Box::new(front));
    let mut simulator = Simulator::new(SyncConfig::default());

    frontend.queue_frame();
    let report = frontend.tick().unwrap();
    assert_eq!(report.sent, vec![Outstanding::Frame(1)]);
    assert_eq!(frontend.state(), SyncState::RequestSent(Outstanding::Frame(1)));

    // Redraws and input while frame 1 is in flight
    frontend.queue_frame();
    frontend.queue_event(InputEvent::KeyDown { view_id: 0, keysym: 65, modifiers: 0 });
    frontend.add_progress(0.25);
    assert!(frontend.tick().unwrap().sent.is_empty());
    assert!(frontend.tick().unwrap().sent.is_empty());
    assert_eq!(back.pending(), 1);

    let request = back.try_recv().unwrap().unwrap();
    back.send(simulator.handle_request(request)).unwrap();

    let report = frontend.tick().unwrap();
    assert_eq!(report.diffs, 1);
    assert_eq!(report.sent, vec![Outstanding::Frame(2)]);
    assert_eq!(back.pending(), 1);

    match back.try_recv().unwrap().unwrap() {
        SimulatorRequest::Frame(setup) => {
            assert_eq!(setup.frame, 2);
            assert_eq!(setup.events.len(), 1);
            assert_eq!(setup.progress, 0.25);
            back.send(simulator.handle_request(SimulatorRequest::Frame(setup))).unwrap();
        }
        other => panic!("unexpected {:?}", other),
    }

    let report = frontend.tick().unwrap();
    assert_eq!(report.diffs, 1);
    assert!(report.sent.is_empty());
    assert!(frontend.is_idle());
    assert_eq!(back.pending(), 0);
}

#[test]
fn stale_diffs_are_dropped() {
    init_logger();
    let (front, mut back) = direct_pair::<SimulatorRequest, SimulatorReply>();
    let mut frontend = Frontend::with_stream(SyncConfig::default(), Box::new(front));

    frontend.queue_frame();
    frontend.tick().unwrap();
    back.try_recv().unwrap().unwrap();

    back.send(SimulatorReply::Diff(UiDiff { frame: 9, ..Default::default() })).unwrap();
    back.send(SimulatorReply::Load(LoadResult::default())).unwrap();
    let report = frontend.tick().unwrap();
    assert_eq!(report.dropped, 2);
    assert_eq!(frontend.state(), SyncState::RequestSent(Outstanding::Frame(1)));

    back.send(SimulatorReply::Diff(UiDiff { frame: 1, ..Default::default() })).unwrap();
    let report = frontend.tick().unwrap();
    assert_eq!(report.diffs, 1);
    assert!(frontend.is_idle());
}

#[test]
fn a_dropped_simulator_disconnects_the_frontend() {
    init_logger();
    let (front, back) = direct_pair::<SimulatorRequest, SimulatorReply>();
    let mut frontend = Frontend::with_stream(SyncConfig::default(), Box::new(front));
    drop(back);

    frontend.queue_frame();
    assert_eq!(frontend.tick(), Err(SyncError::Disconnected));
    assert_eq!(frontend.state(), SyncState::Disconnected);
    assert_eq!(frontend.tick(), Err(SyncError::Disconnected));
}

/// Creates an entity on the first frame and deletes it on the first frame
/// that carries input
#[derive(Default)]
struct SpawnThenDelete {
    spawned: Option<ObjectHandle>,
}

impl SimulationLogic for SpawnThenDelete {
    fn frame(&mut self, ctx: &mut SimulatorContext<'_>, events: &[SimulatorEvent]) -> Result<(), SyncError> {
        match self.spawned {
            None => {
                let entity = ctx.add_entity(None, "spawned")?;
                ctx.add_component(entity, "mesh")?;
                self.spawned = Some(entity);
            }
            Some(entity) if !events.is_empty() => {
                ctx.delete(entity)?;
            }
            Some(_) => {}
        }
        Ok(())
    }
}

#[test]
fn reaped_objects_resolve_until_observers_ran() {
    init_logger();
    let mut frontend =
        Frontend::new(config(Topology::InLoop), Box::new(SpawnThenDelete::default())).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let observed = seen.clone();
    frontend.observe_diffs(Box::new(move |diff, scene, registry| {
        for record in &diff.operations {
            if let Operation::DeleteEntity { entity_id } = record.op {
                let handle = registry.lookup(entity_id);
                let reaped = handle.and_then(|h| scene.get(h)).map_or(false, |object| object.is_reaped());
                observed.borrow_mut().push((entity_id, handle.is_some(), reaped));
            }
        }
    }));

    frontend.queue_frame();
    let report = frontend.tick().unwrap();
    assert_eq!(report.diffs, 1);
    let entity = frontend.scene().handles_of_kind(ObjectKind::Entity)[0];
    let entity_id = frontend.id_of(entity).unwrap();
    assert!(is_canonical_id(entity_id));
    assert_eq!(frontend.scene().components_of(entity).len(), 1);

    frontend.queue_event(InputEvent::KeyDown { view_id: 0, keysym: 32, modifiers: 0 });
    let report = frontend.tick().unwrap();
    assert_eq!(report.diffs, 1);
    assert_eq!(report.collected, 2);

    assert_eq!(*seen.borrow(), vec![(entity_id, true, true)]);
    assert!(frontend.lookup(entity_id).is_none());
    assert!(frontend.scene().is_empty());
}

/// Sets a property on the first entity once a load finishes
struct MarkOnLoad;

impl SimulationLogic for MarkOnLoad {
    fn loaded(&mut self, ctx: &mut SimulatorContext<'_>) -> Result<(), SyncError> {
        if let Some(entity) = ctx.scene().handles_of_kind(ObjectKind::Entity).first().copied() {
            ctx.set_property(entity, 7, PropertyValue::Float(3.0))?;
        }
        Ok(())
    }

    fn frame(&mut self, _ctx: &mut SimulatorContext<'_>, _events: &[SimulatorEvent]) -> Result<(), SyncError> {
        Ok(())
    }
}

fn description() -> UiDescription {
    UiDescription {
        ops: vec![
            Operation::AddEntity {
                parent_id: 0,
                entity: EntityDesc { id: 100, label: "root".to_string(), properties: Vec::new() },
            },
            Operation::AddComponent {
                entity_id: 100,
                component: ComponentDesc { id: 101, type_name: "camera".to_string(), properties: Vec::new() },
            },
        ],
    }
}

#[test]
fn in_loop_load_round_trip() {
    init_logger();
    let mut frontend = Frontend::new(config(Topology::InLoop), Box::new(MarkOnLoad)).unwrap();

    frontend.load(description());
    let report = frontend.tick().unwrap();
    assert_eq!(report.sent, vec![Outstanding::Load, Outstanding::Frame(1)]);
    assert_eq!(report.loads, 1);

    let loaded = frontend.take_loaded().unwrap();
    let root = loaded[&100];
    let camera = loaded[&101];
    assert!(is_canonical_id(frontend.id_of(root).unwrap()));
    assert!(is_canonical_id(frontend.id_of(camera).unwrap()));
    assert!(frontend.registry().iter().all(|(id, _)| is_canonical_id(id)));

    let report = frontend.tick().unwrap();
    assert_eq!(report.diffs, 1);
    assert_eq!(frontend.scene().get_property(root, 7), Some(&PropertyValue::Float(3.0)));
    assert_eq!(frontend.scene().component_owner(camera), Some(root));

    frontend.shutdown().unwrap();
}

#[test]
fn threaded_simulator_round_trip() {
    init_logger();
    let mut frontend = Frontend::new(config(Topology::Thread), Box::new(MarkOnLoad)).unwrap();

    frontend.load(description());
    let report = frontend.wait().unwrap();
    assert_eq!(report.loads, 1);
    assert_eq!(report.sent, vec![Outstanding::Load, Outstanding::Frame(1)]);

    let report = frontend.wait().unwrap();
    assert_eq!(report.diffs, 1);
    let root = frontend.take_loaded().unwrap()[&100];
    assert_eq!(frontend.scene().get_property(root, 7), Some(&PropertyValue::Float(3.0)));

    frontend.shutdown().unwrap();
}

#[test]
fn socket_simulator_round_trip() {
    init_logger();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let server = std::thread::spawn(move || {
        let mut simulator = Simulator::with_logic(SyncConfig::default(), Box::new(MarkOnLoad));
        simulator.serve(&listener)
    });

    let mut frontend = Frontend::new(config(Topology::Socket { address }), Box::new(MarkOnLoad)).unwrap();
    frontend.load(description());

    let mut diffs = 0;
    for _ in 0..500 {
        diffs += frontend.tick().unwrap().diffs;
        if diffs > 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(diffs, 1);

    let root = frontend.take_loaded().unwrap()[&100];
    assert!(is_canonical_id(frontend.id_of(root).unwrap()));
    assert_eq!(frontend.scene().get_property(root, 7), Some(&PropertyValue::Float(3.0)));

    frontend.shutdown().unwrap();
    server.join().unwrap().unwrap();
}
