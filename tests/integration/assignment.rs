use crate::*;

use std::collections::HashSet;

#[tokio::test]
async fn empty_domain_requests_both_mixers_from_its_pool() -> Result<()> {
    let domain = Domain::start_with(DomainOptions {
        pool: Some("west".to_string()),
        ..DomainOptions::default()
    })
    .await?;

    let mut requested = HashSet::new();
    while requested.len() < 2 {
        let assignment = domain.next_assignment().await?;
        assert_eq!(assignment.pool.as_deref(), Some("west"));
        assert_eq!(
            assignment,
            Assignment::create(assignment.target, Some("west".to_string()))
        );
        requested.insert(assignment.target);
    }
    assert!(requested.contains(&NodeType::AudioMixer));
    assert!(requested.contains(&NodeType::AvatarMixer));

    domain.stop().await
}

#[tokio::test]
async fn present_mixer_is_no_longer_requested() -> Result<()> {
    let domain = Domain::start().await?;

    let mixer = Node::bind(NodeType::AudioMixer).await?;
    mixer.announce(domain.addr, &[]).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    domain.drain_assignments();

    for _ in 0..4 {
        let assignment = domain.next_assignment().await?;
        assert_eq!(assignment.target, NodeType::AvatarMixer);
        assert_eq!(assignment.pool, None);
    }

    domain.stop().await
}
