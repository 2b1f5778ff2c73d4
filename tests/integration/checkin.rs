use crate::*;

use domain_core::wire::{HEADER_LEN, IDENTIFIER_LEN, PROTOCOL_VERSION};
use domain_core::NodeId;

#[tokio::test]
async fn new_audio_mixer_gets_header_and_its_id() -> Result<()> {
    let domain = Domain::start().await?;
    let mixer = Node::bind(NodeType::AudioMixer).await?;

    mixer
        .send(domain.addr, &mixer.request(PacketType::AnnounceForDuty, &[])?)
        .await?;
    let raw = mixer.recv_raw().await?;

    assert_eq!(raw.len(), HEADER_LEN + IDENTIFIER_LEN);
    assert_eq!(raw[0], u8::from(PacketType::Domain));
    assert_eq!(raw[1], PROTOCOL_VERSION);
    let reply = decode_reply(&raw)?;
    assert!(reply.entries.is_empty());
    assert_eq!(reply.own_id, NodeId::FIRST);
    assert_eq!(domain.registry.count_alive(), 1);

    domain.stop().await
}

#[tokio::test]
async fn agent_sees_one_of_each_mixer_and_no_agents() -> Result<()> {
    let domain = Domain::start().await?;

    let audio = Node::bind(NodeType::AudioMixer).await?;
    audio.announce(domain.addr, &[]).await?;

    let old_avatar = Node::bind(NodeType::AvatarMixer).await?;
    old_avatar.announce(domain.addr, &[]).await?;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let new_avatar = Node::bind(NodeType::AvatarMixer).await?;
    let newest_id = new_avatar.announce(domain.addr, &[]).await?.own_id;

    let mut others = Vec::new();
    for _ in 0..3 {
        let agent = Node::bind(NodeType::Agent).await?;
        agent.announce(domain.addr, &[]).await?;
        others.push(agent);
    }

    let agent = Node::bind(NodeType::Agent).await?;
    let reply = agent
        .announce(
            domain.addr,
            &[NodeType::AudioMixer, NodeType::AvatarMixer, NodeType::Agent],
        )
        .await?;

    assert_eq!(reply.entries.len(), 2, "{:?}", reply.entries);
    assert!(reply
        .entries
        .iter()
        .any(|e| e.node_type == NodeType::AudioMixer));
    let avatar = reply
        .entries
        .iter()
        .find(|e| e.node_type == NodeType::AvatarMixer)
        .context("no avatar mixer in reply")?;
    assert_eq!(avatar.id, newest_id);
    assert_eq!(avatar.public_address, new_avatar.local_address);
    assert_eq!(domain.registry.count_alive(), 7);

    domain.stop().await
}

#[tokio::test]
async fn repeated_check_ins_keep_the_same_id() -> Result<()> {
    let domain = Domain::start().await?;
    let agent = Node::bind(NodeType::Agent).await?;

    let first = agent.announce(domain.addr, &[]).await?.own_id;
    for _ in 0..3 {
        let reply = agent
            .check_in(domain.addr, PacketType::ListRequest, &[])
            .await?;
        assert_eq!(reply.own_id, first);
    }
    assert_eq!(domain.registry.count_alive(), 1);

    let other = Node::bind(NodeType::Agent).await?;
    let second = other.announce(domain.addr, &[]).await?.own_id;
    assert_eq!(second, first.next());

    domain.stop().await
}

#[tokio::test]
async fn foreign_datagrams_get_no_answer() -> Result<()> {
    let domain = Domain::start().await?;
    let agent = Node::bind(NodeType::Agent).await?;

    let mut stale = agent.request(PacketType::ListRequest, &[])?;
    stale[1] = PROTOCOL_VERSION.wrapping_add(1);
    agent.send(domain.addr, &stale).await?;
    agent.send(domain.addr, b"Zz").await?;
    agent.send(domain.addr, &[b'L']).await?;

    assert!(stays_silent(&agent.socket, Duration::from_millis(200)).await);
    assert!(domain.registry.is_empty());

    let reply = agent.announce(domain.addr, &[]).await?;
    assert_eq!(reply.own_id, NodeId::FIRST);

    domain.stop().await
}

#[tokio::test]
async fn node_count_is_reported_to_stats() -> Result<()> {
    let domain = Domain::start().await?;
    for node_type in [NodeType::AudioMixer, NodeType::Agent] {
        Node::bind(node_type).await?.announce(domain.addr, &[]).await?;
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    let reported = domain
        .metrics
        .records()
        .iter()
        .any(|(_, key, value)| key == domain_services::NODE_COUNT_KEY && *value == 2.0);
    assert!(reported);

    domain.stop().await
}
