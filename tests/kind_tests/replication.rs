//! Integration tests for replication role reconciliation
//!
//! These tests tell the story of one replication owner protecting a volume:
//! first as the secondary, holding a ReplicationDestination, then after
//! failover as the primary, holding a ReplicationSource. Nothing runs VolSync
//! here, so the stories stop short of a completed sync.

use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::{Client, ResourceExt};

use ferry::crd::{
    ProtectedVolume, ReplicationDestination, ReplicationOwner, ReplicationSource, ServiceExport,
};
use ferry::kube_client::TypedApi;
use ferry::{Readiness, Replicator, ReplicatorConfig, OWNER_LABEL};

use super::helpers::{
    create_owner, create_transport_secret, delete_namespace, ensure_test_cluster,
    TEST_SNAPSHOT_CLASS, TEST_STORAGE_CLASS,
};

// =============================================================================
// Test Fixtures
// =============================================================================

fn sample_volume(name: &str) -> ProtectedVolume {
    ProtectedVolume::new(name)
        .storage_class(TEST_STORAGE_CLASS)
        .capacity("1Gi")
        .label("app", "busybox")
}

fn replicator(client: &Client, owner: ReplicationOwner) -> Replicator {
    Replicator::from_client(client.clone(), owner, ReplicatorConfig::default())
}

// =============================================================================
// Secondary Cluster Stories
// =============================================================================

/// Story: A secondary waits for its transport secret, then sets up the
/// inbound endpoint
///
/// The SSH keys for rsync are distributed out of band. Until they land, the
/// replicator must not create anything, or VolSync would mint keys of its own.
///
/// Expected behavior:
/// - Without the secret, reconciling reports not ready and creates nothing
/// - With the secret, the destination and its ServiceExport appear, owned
///   and labeled for the owner
/// - The secret is adopted by the owner
/// - The destination stays not ready while no sync has happened
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_secondary_waits_for_secret_then_creates_destination() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let namespace = "ferry-it-secondary";
    let owner = create_owner(&client, namespace, "busybox-vrg")
        .await
        .expect("failed to create owner");
    let replicator = replicator(&client, owner.clone());
    let api = TypedApi::from_client(client.clone());
    let volume = sample_volume("busybox-pvc");

    // Act: reconcile before the secret exists
    let result = replicator
        .reconcile_rd(&volume)
        .await
        .expect("reconcile without secret failed");

    // Assert: nothing happens yet
    assert_eq!(result, Readiness::NotReady);
    assert!(api
        .get::<ReplicationDestination>(Some(namespace), "busybox-pvc")
        .await
        .expect("failed to get destination")
        .is_none());

    // Act: the keys arrive and the secondary reconciles again
    create_transport_secret(&client, &owner)
        .await
        .expect("failed to create secret");
    let result = replicator
        .reconcile_rd(&volume)
        .await
        .expect("reconcile with secret failed");
    assert_eq!(result, Readiness::NotReady, "no sync has happened yet");

    // Assert: destination carries the volume shape and owner identity
    let rd = api
        .get::<ReplicationDestination>(Some(namespace), "busybox-pvc")
        .await
        .expect("failed to get destination")
        .expect("destination should exist");
    assert_eq!(rd.labels()[OWNER_LABEL], "busybox-vrg");
    assert_eq!(rd.owner_references()[0].uid, owner.uid);
    let rsync = rd.spec.rsync.as_ref().expect("rsync settings");
    assert_eq!(rsync.ssh_keys.as_deref(), Some("busybox-vrg-vs-secret"));
    assert_eq!(
        rsync.volume_snapshot_class_name.as_deref(),
        Some(TEST_SNAPSHOT_CLASS)
    );

    // Assert: the rsync service is exported, owned by the destination
    let export = api
        .get::<ServiceExport>(Some(namespace), "volsync-rsync-dst-busybox-pvc")
        .await
        .expect("failed to get service export")
        .expect("service export should exist");
    assert_eq!(export.owner_references()[0].name, "busybox-pvc");

    // Assert: the secret now belongs to the owner
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = secrets
        .get("busybox-vrg-vs-secret")
        .await
        .expect("failed to get secret");
    assert!(secret
        .owner_references()
        .iter()
        .any(|r| r.uid == owner.uid));

    // Act: reconciling again changes nothing
    let before = rd.resource_version();
    let _ = replicator
        .reconcile_rd(&volume)
        .await
        .expect("second reconcile failed");
    let rd = api
        .get::<ReplicationDestination>(Some(namespace), "busybox-pvc")
        .await
        .expect("failed to get destination")
        .expect("destination should exist");
    assert_eq!(rd.resource_version(), before);

    delete_namespace(&client, namespace).await;
}

// =============================================================================
// Failover Stories
// =============================================================================

/// Story: On failover the former secondary swaps its destination for a source
///
/// When the owner becomes primary, the inbound endpoint must be gone before
/// the outbound one exists, so the two roles never overlap for a volume.
///
/// Expected behavior:
/// - The destination is deleted and a scheduled source replaces it
/// - The source stays not ready until VolSync reports a sync
/// - Stale destinations for volumes no longer protected are cleaned up
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_failover_swaps_destination_for_source() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let namespace = "ferry-it-failover";
    let owner = create_owner(&client, namespace, "busybox-vrg")
        .await
        .expect("failed to create owner");
    create_transport_secret(&client, &owner)
        .await
        .expect("failed to create secret");
    let replicator = replicator(&client, owner);
    let api = TypedApi::from_client(client.clone());
    let kept = sample_volume("busybox-pvc");
    let dropped = sample_volume("scratch-pvc");

    // Arrange: the secondary protects two volumes
    for volume in [&kept, &dropped] {
        let _ = replicator
            .reconcile_rd(volume)
            .await
            .expect("failed to reconcile destination");
    }

    // Act: one volume leaves protection
    replicator
        .cleanup_rd_not_in(std::slice::from_ref(&kept))
        .await
        .expect("cleanup failed");
    assert!(api
        .get::<ReplicationDestination>(Some(namespace), "scratch-pvc")
        .await
        .expect("failed to get destination")
        .is_none());

    // Act: failover makes this cluster primary
    let result = replicator
        .reconcile_rs(&kept, false)
        .await
        .expect("failed to reconcile source");

    // Assert: roles swapped, source waiting on its first sync
    assert_eq!(result, Readiness::NotReady);
    assert!(api
        .get::<ReplicationDestination>(Some(namespace), "busybox-pvc")
        .await
        .expect("failed to get destination")
        .is_none());
    let rs = api
        .get::<ReplicationSource>(Some(namespace), "busybox-pvc")
        .await
        .expect("failed to get source")
        .expect("source should exist");
    assert_eq!(rs.spec.source_pvc, "busybox-pvc");
    let trigger = rs.spec.trigger.as_ref().expect("trigger");
    assert_eq!(trigger.schedule.as_deref(), Some("*/10 * * * *"));
    assert!(trigger.manual.is_none());
    assert_eq!(
        rs.spec.rsync.as_ref().and_then(|r| r.address.as_deref()),
        Some("volsync-rsync-dst-busybox-pvc.ferry-it-failover.svc.clusterset.local")
    );
    assert!(!replicator
        .is_rs_data_protected("busybox-pvc")
        .await
        .expect("failed to check protection"));

    delete_namespace(&client, namespace).await;
}
