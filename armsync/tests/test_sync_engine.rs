use std::time::Duration;

use armsync::{
    render_frame, ConnectionState, DummyTransport, JointSpecs, MotionState, MoveOutcome, MovePath,
    PlacementModel, RenderFrame, RenderShape, SyncEngine, SyncOptions,
};
use assert_approx_eq::assert_approx_eq;

#[tokio::test(start_paused = true)]
async fn test_authority_state_reaches_renderer() {
    let (transport, mut authority) = DummyTransport::new();
    let specs = JointSpecs::kuka_iiwa();
    let (handle, task) = SyncEngine::new(specs.clone(), transport, SyncOptions::default()).spawn();
    assert!(handle.wait_until_open(Duration::from_secs(1)).await.unwrap());
    let mut peer = authority.accept().await.unwrap();
    assert_eq!(peer.recv().await.unwrap(), r#"{"type":"get_state"}"#);

    peer.send_text(r#"{"type":"joint_state","angles":[90,0,0,0,0,0,0]}"#);
    let snapshot = handle.wait_for(|s| s.current[0] == 90.0).await.unwrap();

    let frame = render_frame(
        RenderShape::Placements,
        &specs,
        &snapshot.current,
        PlacementModel::ApproximateStack,
    )
    .unwrap();
    let RenderFrame::Placements(links) = frame else {
        panic!("unexpected render frame");
    };
    assert_eq!(links.len(), 7);
    // a pure base yaw leaves the upright arm in place
    assert_approx_eq!(links[6].position.y, 0.34 + 0.4 + 0.4 + 0.2 + 0.2 + 0.126);
    assert_approx_eq!(links[6].position.x, 0.0);

    let frame = render_frame(
        RenderShape::NamedJoints,
        &specs,
        &snapshot.current,
        PlacementModel::ApproximateStack,
    )
    .unwrap();
    let RenderFrame::NamedJoints(joints) = frame else {
        panic!("unexpected render frame");
    };
    assert_approx_eq!(joints["lbr_iiwa_joint_1"], std::f64::consts::FRAC_PI_2);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_falls_back_to_local_when_authority_is_down() {
    let (transport, _authority) = DummyTransport::new();
    transport.set_fail_always(true);
    let (handle, _task) =
        SyncEngine::new(JointSpecs::six_axis(), transport, SyncOptions::default()).spawn();
    assert!(!handle.wait_until_open(Duration::from_millis(500)).await.unwrap());

    handle.set_target(1, 500.0).await.unwrap();
    handle.set_target(2, -45.0).await.unwrap();
    assert_eq!(
        handle.move_to_target().await.unwrap(),
        MoveOutcome::Started(MovePath::Local)
    );
    // edits while moving land in target but do not start a second move
    handle.set_target(3, 10.0).await.unwrap();
    assert_eq!(handle.move_to_target().await.unwrap(), MoveOutcome::Ignored);

    let snapshot = handle.wait_until_idle().await.unwrap();
    assert_eq!(snapshot.motion, MotionState::Idle);
    assert_ne!(snapshot.connection, ConnectionState::Open);
    assert_approx_eq!(snapshot.current[1], 90.0);
    assert_approx_eq!(snapshot.current[2], -45.0);
    assert_approx_eq!(snapshot.current[3], 0.0);
    assert_eq!(snapshot.target[3], 10.0);
}
