use crate::*;

#[tokio::test]
async fn silent_node_is_reaped_and_rejoins_with_a_new_id() -> Result<()> {
    let domain = Domain::start_with(DomainOptions {
        liveness_timeout: Duration::from_millis(200),
        check_interval: Duration::from_millis(20),
        ..DomainOptions::default()
    })
    .await?;

    let agent = Node::bind(NodeType::Agent).await?;
    let first = agent.announce(domain.addr, &[]).await?.own_id;
    assert_eq!(domain.registry.count_alive(), 1);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(domain.registry.is_empty());
    assert!(domain.registry.get(first).is_none());

    let again = agent.announce(domain.addr, &[]).await?.own_id;
    assert_ne!(again, first);

    domain.stop().await
}

#[tokio::test]
async fn checking_in_keeps_a_node_alive() -> Result<()> {
    let domain = Domain::start_with(DomainOptions {
        liveness_timeout: Duration::from_millis(300),
        check_interval: Duration::from_millis(20),
        ..DomainOptions::default()
    })
    .await?;

    let agent = Node::bind(NodeType::Agent).await?;
    let id = agent.announce(domain.addr, &[]).await?.own_id;
    for _ in 0..8 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let reply = agent
            .check_in(domain.addr, PacketType::ListRequest, &[])
            .await?;
        assert_eq!(reply.own_id, id);
    }
    assert!(domain.registry.get(id).is_some());

    domain.stop().await
}
