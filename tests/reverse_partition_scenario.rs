use std::sync::Arc;

use mesh_coupler::adapter::{ArrayFieldAdapter, ClassifiedFieldAdapter, FieldAdapter};
use mesh_coupler::algs::channel::Channel;
use mesh_coupler::algs::communicator::{LocalHub, Side};
use mesh_coupler::algs::field_communicator::{FieldCommunicator, Role, SendMode};
use mesh_coupler::algs::reverse_partition::client_layout;
use mesh_coupler::partitioning::{ClassPartition, Partition};
use mesh_coupler::topology::{Gid, ModelEnt, ReverseClassification};
use proptest::prelude::*;

const NODES: usize = 23;
const RANK0_NODES: [usize; 6] = [0, 2, 3, 4, 5, 6];

/// 23 nodes; 0..19 sit in the overlap, nodes 0 and 2..=6 on a model face
/// owned by rank 0, the rest on a face owned by rank 1, and 19..23 on a
/// face outside the overlap.
fn scenario() -> (ClassifiedFieldAdapter<f64>, Arc<Partition>) {
    let mut rc = ReverseClassification::new();
    for node in 0..NODES {
        let ent = if node >= 19 {
            ModelEnt::new(2, 99)
        } else if RANK0_NODES.contains(&node) {
            ModelEnt::new(2, 1)
        } else {
            ModelEnt::new(2, 2)
        };
        rc.insert(ent, node);
    }
    let data = (0..NODES).map(|n| 10.0 * n as f64).collect();
    let adapter =
        ClassifiedFieldAdapter::new("flux", data, Arc::new(rc), |_, id| id != 99).unwrap();
    let partition =
        ClassPartition::new(vec![0, 1], vec![ModelEnt::new(2, 1), ModelEnt::new(2, 2)]).unwrap();
    (adapter, Arc::new(Partition::from(partition)))
}

fn rank1_nodes() -> Vec<usize> {
    (0..19).filter(|n| !RANK0_NODES.contains(n)).collect()
}

#[test]
fn masked_field_splits_six_and_thirteen() {
    let (adapter, partition) = scenario();
    assert_eq!(adapter.size(), 19);
    let map = adapter.reverse_partition_map(&partition).unwrap();
    assert_eq!(map[&0], RANK0_NODES.to_vec());
    assert_eq!(map[&1], rank1_nodes());

    let layout = client_layout("flux", &map, &partition.ranks(), adapter.size()).unwrap();
    assert_eq!(layout.peers, vec![0, 1]);
    assert_eq!(layout.offsets, vec![0, 6, 19]);
    let mut expected = vec![0, 6, 1, 2, 3, 4, 5];
    expected.extend(7..19);
    assert_eq!(layout.permutation, expected);

    let mut buffer = vec![0.0; 19];
    adapter.serialize(&mut buffer, &layout.permutation).unwrap();
    let rank0: Vec<f64> = RANK0_NODES.iter().map(|&n| 10.0 * n as f64).collect();
    assert_eq!(&buffer[..6], rank0.as_slice());
    assert_eq!(buffer[6], 10.0);
}

#[test]
fn rendezvous_ranks_receive_their_share() {
    let (mut adapter, partition) = scenario();
    let hub = LocalHub::new();
    let mut client = FieldCommunicator::new(
        "flux",
        Channel::new("app", hub.endpoint(Side::Client, 0)),
        Role::Client { partition },
    );
    let expected: [Vec<usize>; 2] = [RANK0_NODES.to_vec(), rank1_nodes()];
    let mut servers: Vec<_> = (0..2)
        .map(|rank| {
            let comm = FieldCommunicator::new(
                "flux",
                Channel::new("app", hub.endpoint(Side::Server, rank)),
                Role::Server { client_ranks: 1 },
            );
            let gids: Vec<Gid> = expected[rank].iter().rev().map(|&n| n as Gid).collect();
            (comm, ArrayFieldAdapter::<f64>::zeroed("flux", gids, 1).unwrap())
        })
        .collect();

    client.channel().begin_send_phase().unwrap();
    client.send(&adapter, SendMode::Synchronous).unwrap();
    client.channel().end_send_phase().unwrap();

    for (comm, field) in &mut servers {
        comm.channel().begin_receive_phase().unwrap();
        comm.receive(field).unwrap();
        comm.channel().end_receive_phase().unwrap();
    }
    for (rank, (_, field)) in servers.iter().enumerate() {
        let want: Vec<f64> = expected[rank].iter().rev().map(|&n| 10.0 * n as f64).collect();
        assert_eq!(field.values(), want.as_slice(), "rank {rank}");
    }
    assert_eq!(hub.pending(), 0);

    // and back again, doubled
    for (comm, field) in &mut servers {
        for v in field.values_mut() {
            *v *= 2.0;
        }
        comm.channel().begin_send_phase().unwrap();
        comm.send(field, SendMode::Synchronous).unwrap();
        comm.channel().end_send_phase().unwrap();
    }
    adapter.data_mut().iter_mut().for_each(|v| *v = -1.0);
    client.channel().begin_receive_phase().unwrap();
    client.receive(&mut adapter).unwrap();
    client.channel().end_receive_phase().unwrap();
    for (n, v) in adapter.data().iter().enumerate() {
        let want = if n < 19 { 20.0 * n as f64 } else { -1.0 };
        assert_eq!(*v, want, "node {n}");
    }
}

fn arb_routing() -> impl Strategy<Value = (Vec<bool>, Vec<usize>)> {
    (1usize..40).prop_flat_map(|n| {
        (
            prop::collection::vec(any::<bool>(), n),
            prop::collection::vec(0usize..4, n),
        )
    })
}

proptest! {
    #[test]
    fn reverse_map_partitions_masked_nodes((selected, owner) in arb_routing()) {
        prop_assume!(selected.iter().any(|s| *s));
        let mut rc = ReverseClassification::new();
        for (node, &r) in owner.iter().enumerate() {
            let id = if selected[node] { r as i32 } else { -1 };
            rc.insert(ModelEnt::new(2, id), node);
        }
        let data = vec![0i64; selected.len()];
        let adapter =
            ClassifiedFieldAdapter::new("p", data, Arc::new(rc), |_, id| id >= 0).unwrap();
        let ents = (0..4).map(|i| ModelEnt::new(2, i)).collect();
        let partition = Partition::from(ClassPartition::new(vec![0, 1, 2, 3], ents).unwrap());
        let map = adapter.reverse_partition_map(&partition).unwrap();

        let mut seen: Vec<usize> = map.values().flatten().copied().collect();
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..adapter.size()).collect::<Vec<_>>());

        let layout = client_layout("p", &map, &partition.ranks(), adapter.size()).unwrap();
        prop_assert_eq!(layout.offsets.len(), layout.peers.len() + 1);
        prop_assert_eq!(layout.offsets[0], 0);
        prop_assert!(layout.offsets.windows(2).all(|w| w[0] <= w[1]));
        prop_assert_eq!(layout.count(), adapter.size());
        let mut slots = layout.permutation.clone();
        slots.sort_unstable();
        prop_assert_eq!(slots, (0..adapter.size()).collect::<Vec<_>>());
    }
}
