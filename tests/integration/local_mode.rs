use crate::*;

/// A node on the server's own host whose replies go to a second socket,
/// so the test can tell which address the server answered on.
async fn co_located_node(node_type: NodeType) -> Result<(Node, UdpSocket)> {
    let mut node = Node::bind(node_type).await?;
    let inbox = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let SocketAddr::V4(declared) = inbox.local_addr()? else {
        bail!("expected an IPv4 socket");
    };
    node.local_address = declared;
    Ok((node, inbox))
}

#[tokio::test]
async fn co_located_node_is_answered_on_its_local_address() -> Result<()> {
    let domain = Domain::start_with(DomainOptions {
        host_address: Ipv4Addr::LOCALHOST,
        ..DomainOptions::default()
    })
    .await?;

    let (mixer, inbox) = co_located_node(NodeType::AudioMixer).await?;
    mixer
        .send(domain.addr, &mixer.request(PacketType::AnnounceForDuty, &[])?)
        .await?;

    let reply = decode_reply(&recv_raw(&inbox).await?)?;
    assert!(stays_silent(&mixer.socket, Duration::from_millis(100)).await);

    let node = domain
        .registry
        .get(reply.own_id)
        .context("mixer not registered")?;
    let sender_port = mixer.socket.local_addr()?.port();
    assert_eq!(
        node.public_address,
        SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, sender_port)
    );
    assert_eq!(node.local_address, mixer.local_address);

    // Peers see the zero sentinel and fall back to the local address.
    let (agent, agent_inbox) = co_located_node(NodeType::Agent).await?;
    agent
        .send(
            domain.addr,
            &agent.request(PacketType::AnnounceForDuty, &[NodeType::AudioMixer])?,
        )
        .await?;
    let seen = decode_reply(&recv_raw(&agent_inbox).await?)?;
    assert_eq!(seen.entries.len(), 1);
    assert!(seen.entries[0].public_address.ip().is_unspecified());
    assert_eq!(seen.entries[0].local_address, mixer.local_address);

    domain.stop().await
}

#[tokio::test]
async fn local_mode_keeps_real_addresses() -> Result<()> {
    let domain = Domain::start_with(DomainOptions {
        host_address: Ipv4Addr::LOCALHOST,
        local_mode: true,
        ..DomainOptions::default()
    })
    .await?;

    let (mixer, inbox) = co_located_node(NodeType::AudioMixer).await?;
    mixer
        .send(domain.addr, &mixer.request(PacketType::AnnounceForDuty, &[])?)
        .await?;

    let reply = decode_reply(&mixer.recv_raw().await?)?;
    assert!(stays_silent(&inbox, Duration::from_millis(100)).await);

    let node = domain
        .registry
        .get(reply.own_id)
        .context("mixer not registered")?;
    assert_eq!(
        SocketAddr::V4(node.public_address),
        mixer.socket.local_addr()?
    );

    domain.stop().await
}
