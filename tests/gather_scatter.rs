use std::sync::{Arc, Mutex};

use mesh_coupler::prelude::*;

const GIDS: [Gid; 5] = [100, 101, 102, 103, 104];

/// Five vertices: a unit-square strip with one extra column.
fn mesh() -> Arc<InternalMesh> {
    let coords = vec![0.0, 0.0, 1.0, 0.0, 2.0, 0.0, 0.0, 1.0, 1.0, 1.0];
    let tris = vec![[0, 1, 4], [0, 4, 3], [1, 2, 4]];
    Arc::new(
        InternalMesh::new(coords, tris)
            .unwrap()
            .with_gids(GIDS.to_vec())
            .unwrap(),
    )
}

fn partition() -> Arc<Partition> {
    let p = ClassPartition::new(vec![0], vec![ModelEnt::new(2, 1)]).unwrap();
    Arc::new(Partition::from(p))
}

fn native<T: Element>(name: &str, values: Vec<T>) -> ArrayFieldAdapter<T> {
    ArrayFieldAdapter::new(name, GIDS.to_vec(), values, 1)
        .unwrap()
        .with_classification(vec![ModelEnt::new(2, 1); GIDS.len()])
        .unwrap()
}

struct App<T: Element> {
    client: CouplerClient<LocalComm>,
    field: FieldId,
    hub: Arc<LocalHub>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Element> App<T> {
    fn new(name: &str, values: Vec<T>) -> Self {
        let hub = LocalHub::new();
        let mut client = CouplerClient::new(name, hub.endpoint(Side::Client, 0), partition());
        let field = client.add_field("density", native(name, values)).unwrap();
        Self {
            client,
            field,
            hub,
            _marker: std::marker::PhantomData,
        }
    }

    fn send(&mut self) {
        let id = self.field;
        self.client
            .send_phase(|c| c.send_field(id, SendMode::Synchronous))
            .unwrap();
    }

    fn receive(&mut self) -> Vec<T> {
        let id = self.field;
        self.client.receive_phase(|c| c.receive_field(id)).unwrap();
        self.client
            .field_adapter::<ArrayFieldAdapter<T>>(id)
            .unwrap()
            .values()
            .to_vec()
    }
}

fn server(config: CouplerConfig) -> CouplerServer<LocalComm> {
    CouplerServer::new("rendezvous", partition(), mesh(), config).unwrap()
}

fn attach<T: Element>(
    server: &mut CouplerServer<LocalComm>,
    hub: &Arc<LocalHub>,
    name: &str,
) -> (ApplicationId, FieldId) {
    let id = server
        .add_application(name, hub.endpoint(Side::Server, 0), 1)
        .unwrap();
    let adapter = ArrayFieldAdapter::<T>::zeroed(name, GIDS.to_vec(), 1).unwrap();
    let field = server
        .application_mut(id)
        .unwrap()
        .add_field_default("density", adapter)
        .unwrap();
    (id, field)
}

#[test]
fn two_sources_are_summed_and_scattered_back() {
    let mut a = App::new("a", vec![1.0f64, 2.0, 3.0, 4.0, 5.0]);
    let mut b = App::new("b", vec![10.0f64, 20.0, 30.0, 40.0, 50.0]);
    let mut s = server(CouplerConfig::default());
    let (app_a, fa) = attach::<f64>(&mut s, &a.hub, "a");
    let (app_b, fb) = attach::<f64>(&mut s, &b.hub, "b");
    s.add_gather_fields_op(
        "merge",
        &[fa, fb],
        InternalFieldSpec::new("total", ElementType::F64),
        combiner(combiners::sum),
    )
    .unwrap();
    s.add_scatter_fields_op(
        "split",
        InternalFieldSpec::new("total", ElementType::F64),
        &[fa, fb],
    )
    .unwrap();
    assert!(s.internal_field_is_valid("total").unwrap());

    a.send();
    b.send();
    s.receive_phase(&[app_a, app_b], |s| s.gather_fields("merge"))
        .unwrap();
    let total = s.internal_field("total").unwrap();
    assert_eq!(
        total.values::<f64>().unwrap(),
        &[11.0, 22.0, 33.0, 44.0, 55.0]
    );
    assert!(s.internal_field_is_valid("total").unwrap());
    assert_eq!(
        s.field_adapter::<ArrayFieldAdapter<f64>>(fb)
            .unwrap()
            .values(),
        &[10.0, 20.0, 30.0, 40.0, 50.0]
    );

    s.send_phase(&[app_a, app_b], |s| s.scatter_fields("split"))
        .unwrap();
    assert_eq!(a.receive(), vec![11.0, 22.0, 33.0, 44.0, 55.0]);
    assert_eq!(b.receive(), vec![11.0, 22.0, 33.0, 44.0, 55.0]);
    assert_eq!(a.hub.pending() + b.hub.pending(), 0);

    // second round reuses the cached layouts
    a.client
        .field_adapter_mut::<ArrayFieldAdapter<f64>>(a.field)
        .unwrap()
        .values_mut()
        .fill(1.0);
    a.send();
    b.send();
    s.receive_phase(&[app_a, app_b], |s| s.gather_fields("merge"))
        .unwrap();
    assert_eq!(
        s.internal_field("total").unwrap().values::<f64>().unwrap(),
        &[12.0, 23.0, 34.0, 45.0, 56.0]
    );
}

#[test]
fn combiner_sees_sources_in_registration_order() {
    let mut a = App::new("a", vec![1i32; 5]);
    let mut b = App::new("b", vec![2i32; 5]);
    let mut s = server(CouplerConfig::default());
    let (app_a, fa) = attach::<i32>(&mut s, &a.hub, "a");
    let (app_b, fb) = attach::<i32>(&mut s, &b.hub, "b");

    let order = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&order);
    s.add_gather_fields_op(
        "merge",
        &[fb, fa],
        InternalFieldSpec::new("merged", ElementType::I32),
        combiner(move |sources, target| {
            seen.lock()
                .unwrap()
                .extend(sources.iter().map(|f| f.values::<i32>().unwrap()[0]));
            combiners::priority_override(sources, target)
        }),
    )
    .unwrap();

    // a arrives first; b is still listed first
    a.send();
    b.send();
    s.receive_phase(&[app_a, app_b], |s| s.gather_fields("merge"))
        .unwrap();
    assert_eq!(*order.lock().unwrap(), vec![2, 1]);
    // later sources win
    assert_eq!(
        s.internal_field("merged").unwrap().values::<i32>().unwrap(),
        &[1; 5]
    );
}

#[test]
fn scatter_converts_to_each_target_type() {
    let mut a = App::new("a", vec![0.0f32; 5]);
    let mut b = App::new("b", vec![0i64; 5]);
    let mut s = server(CouplerConfig::default());
    let (app_a, fa) = attach::<f32>(&mut s, &a.hub, "a");
    let (app_b, fb) = attach::<i64>(&mut s, &b.hub, "b");
    s.add_scatter_fields_op(
        "broadcast",
        InternalFieldSpec::new("temperature", ElementType::F64),
        &[fa, fb],
    )
    .unwrap();
    s.internal_field_mut("temperature")
        .unwrap()
        .values_mut::<f64>()
        .unwrap()
        .copy_from_slice(&[3.0, -1.0, 7.0, 2.0, 5.0]);

    // first exchange needs the application gids
    a.send();
    b.send();
    s.receive_phase(&[app_a, app_b], |s| {
        s.receive_field(fa)?;
        s.receive_field(fb)
    })
    .unwrap();

    s.send_phase(&[app_a, app_b], |s| s.scatter_fields("broadcast"))
        .unwrap();
    assert_eq!(a.receive(), vec![3.0f32, -1.0, 7.0, 2.0, 5.0]);
    assert_eq!(b.receive(), vec![3i64, -1, 7, 2, 5]);
}

#[test]
fn failed_gather_leaves_target_stale() {
    let mut a = App::new("a", vec![1.0f64; 5]);
    let b = App::new("b", vec![2.0f64; 5]);
    let config = CouplerConfig {
        recv_timeout_ms: Some(20),
        ..CouplerConfig::default()
    };
    let mut s = server(config);
    let (app_a, fa) = attach::<f64>(&mut s, &a.hub, "a");
    let (app_b, fb) = attach::<f64>(&mut s, &b.hub, "b");
    s.add_gather_fields_op(
        "merge",
        &[fa, fb],
        InternalFieldSpec::new("total", ElementType::F64),
        combiner(combiners::sum),
    )
    .unwrap();
    s.add_scatter_fields_op(
        "split",
        InternalFieldSpec::new("total", ElementType::F64),
        &[fa],
    )
    .unwrap();

    // b never sends
    a.send();
    let err = s
        .receive_phase(&[app_a, app_b], |s| s.gather_fields("merge"))
        .unwrap_err();
    assert!(matches!(err, CouplingError::CommError { .. }), "{err:?}");
    assert!(!s.internal_field_is_valid("total").unwrap());
    assert_eq!(
        s.application(app_a).unwrap().phase(),
        mesh_coupler::algs::channel::Phase::Idle
    );

    let err = s
        .send_phase(&[app_a], |s| s.scatter_fields("split"))
        .unwrap_err();
    assert_eq!(err, CouplingError::StaleInternalField("total".into()));
}

#[test]
fn registration_rejects_duplicates_and_keeps_state() {
    let a = App::new("a", vec![0.0f64; 5]);
    let mut s = server(CouplerConfig::default());
    let (app_a, fa) = attach::<f64>(&mut s, &a.hub, "a");

    let again = s.add_application("a", a.hub.endpoint(Side::Server, 0), 1);
    assert!(matches!(again, Err(CouplingError::DuplicateName { .. })));

    let app = s.application_mut(app_a).unwrap();
    let dup = app.add_field_default(
        "density",
        ArrayFieldAdapter::<f64>::zeroed("x", GIDS.to_vec(), 1).unwrap(),
    );
    assert!(matches!(dup, Err(CouplingError::DuplicateName { .. })));
    // a bad mask registers nothing, so the name stays free
    let bad = app.add_field(
        "pressure",
        ArrayFieldAdapter::<f64>::zeroed("p", GIDS.to_vec(), 1).unwrap(),
        TransferOptions::copy(),
        TransferOptions::copy(),
        Some(vec![true; 3]),
    );
    assert!(bad.is_err());
    assert!(app.field_id("pressure").is_err());
    app.add_field_default(
        "pressure",
        ArrayFieldAdapter::<f64>::zeroed("p", GIDS.to_vec(), 1).unwrap(),
    )
    .unwrap();

    s.add_gather_fields_op(
        "merge",
        &[fa],
        InternalFieldSpec::new("total", ElementType::F64),
        combiner(combiners::sum),
    )
    .unwrap();
    let dup = s.add_gather_fields_op(
        "merge",
        &[fa],
        InternalFieldSpec::new("other", ElementType::F64),
        combiner(combiners::sum),
    );
    assert!(matches!(dup, Err(CouplingError::DuplicateName { .. })));
    assert!(s.internal_field("other").is_err());

    let mismatch = s.add_scatter_fields_op(
        "split",
        InternalFieldSpec::new("total", ElementType::I32),
        &[fa],
    );
    assert!(matches!(
        mismatch,
        Err(CouplingError::ElementTypeMismatch { .. })
    ));
}
