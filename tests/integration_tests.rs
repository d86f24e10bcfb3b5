//! Integration tests for the arena server and client working together
//!
//! These tests drive the authoritative world through real ticks and feed what
//! the synchronizer produces into client-side state, and finally run a
//! headless client against a live server.

use client::game::ClientGameState;
use server::config::{GameConfig, ValueRange};
use server::entity::Entity;
use server::game::World;
use server::lifecycle::{LifecycleManager, SpawnKind};
use server::simulation::Simulation;
use server::stats::MemoryStatsSink;
use server::sync::{DeltaSynchronizer, SyncFrame};
use shared::{
    ClientId, ClientInput, EntityId, EntityKind, Field, FieldValue, Flag, InputKey, InputState,
    Packet, COIN_DESPAWN_MS,
};
use std::sync::Arc;

fn place(world: &mut World, build: impl FnOnce(EntityId) -> Entity, x: f64, y: f64) -> EntityId {
    let mut entity = build(world.next_id());
    entity.place_at(x, y);
    world.insert(entity)
}

fn respawning_coin(id: EntityId) -> Entity {
    Entity::coin(id, 1, COIN_DESPAWN_MS, 0).with_respawn(SpawnKind::Coin {
        value: ValueRange::exact(1),
    })
}

fn apply(game: &mut ClientGameState, packet: &Packet) {
    match packet {
        Packet::FullSnapshot(snapshot) => {
            game.apply_snapshot(snapshot);
        }
        Packet::StateDiff(diff) => {
            game.apply_diff(diff);
        }
        other => panic!("unexpected packet {:?}", other),
    }
}

fn expect_diff(packet: Option<Packet>) -> shared::StateDiff {
    match packet {
        Some(Packet::StateDiff(diff)) => diff,
        other => panic!("expected a diff, got {:?}", other),
    }
}

/// WORLD AND SYNCHRONIZER TESTS
mod sync_tests {
    use super::*;

    /// A collected coin is reported to every client with its hunter, exactly
    /// once, is replaced in the same tick and is then destroyed.
    #[test]
    fn coin_pickup_reaches_every_client_once_then_is_destroyed() {
        // Large enough that the replacement coin will not land on the player.
        let mut world = World::new(40_000.0, 40_000.0);
        let mut lifecycle = LifecycleManager::with_seed(Vec::new(), 16, COIN_DESPAWN_MS, 7);
        let mut sync = DeltaSynchronizer::new();
        let mut games = [ClientGameState::new(), ClientGameState::new()];
        let clients: [ClientId; 2] = [1, 2];

        let player = place(&mut world, |id| Entity::player(id, "hunter", 0), 1000.0, 1000.0);
        let coin = place(&mut world, respawning_coin, 3000.0, 3000.0);
        for client in clients {
            sync.add_client(client, world.tick());
        }

        let output = world.step(Vec::new(), &mut lifecycle, 33.0);
        let frame = SyncFrame::capture(&world, &output.events);
        for (client, game) in clients.iter().zip(games.iter_mut()) {
            let packet = sync.prepare(*client, &frame, 0, Some(player)).unwrap();
            assert!(matches!(packet, Packet::FullSnapshot(_)));
            apply(game, &packet);
        }

        if let Some(entity) = world.get_mut(coin) {
            entity.place_at(1000.0, 1050.0);
        }
        let output = world.step(Vec::new(), &mut lifecycle, 33.0);
        assert_eq!(output.spawned.len(), 1);
        assert_eq!(output.spawned[0].kind, EntityKind::Coin);
        assert_eq!(world.count_active(EntityKind::Coin), 1);

        let frame = SyncFrame::capture(&world, &output.events);
        for (client, game) in clients.iter().zip(games.iter_mut()) {
            let diff = expect_diff(sync.prepare(*client, &frame, 0, Some(player)));
            assert_eq!(diff.removed_ids, vec![coin]);

            let coin_diff = diff.entity(coin).unwrap();
            assert!(coin_diff
                .fields
                .iter()
                .any(|update| update.field == Field::HunterId
                    && update.value == FieldValue::Entity(Some(player))));
            assert_eq!(diff.entity(player).unwrap().flags, vec![Flag::GetCoin]);
            assert_eq!(
                diff.entity(output.spawned[0].id).unwrap().kind,
                Some(EntityKind::Coin)
            );

            game.apply_diff(&diff);
            let mirror = game.mirror(coin).unwrap();
            assert!(mirror.is_removing());
            assert_eq!(
                mirror.state().get(Field::HunterId),
                Some(&FieldValue::Entity(Some(player)))
            );
        }

        assert_eq!(world.destroy_removed(), vec![coin]);
        sync.forget(&[coin]);
        assert!(world.get(coin).is_none());

        let output = world.step(Vec::new(), &mut lifecycle, 33.0);
        let frame = SyncFrame::capture(&world, &output.events);
        for client in clients {
            // The player's coin count already went out; nothing is left to say.
            assert!(sync.prepare(client, &frame, 0, Some(player)).is_none());
            assert!(!sync.client(client).unwrap().knows(coin));
        }

        for game in games.iter_mut() {
            assert_eq!(game.update(1000.0, false), vec![coin]);
            assert_eq!(game.mirror(player).unwrap().state().get_i64(Field::Coins), Some(1));
        }
    }

    /// A flag raised on an entity during the tick it is removed still reaches
    /// every client that knew the entity, exactly once, next to the removal.
    #[test]
    fn flag_raised_on_removal_tick_is_delivered_once() {
        let mut world = World::new(40_000.0, 40_000.0);
        let mut lifecycle = LifecycleManager::with_seed(Vec::new(), 16, COIN_DESPAWN_MS, 9);
        let mut sync = DeltaSynchronizer::new();
        let clients: [ClientId; 2] = [1, 2];

        let player = place(&mut world, |id| Entity::player(id, "victim", 0), 1000.0, 1000.0);
        let spike = place(&mut world, |id| Entity::ice_spike(id, 0), 5000.0, 5000.0);
        for client in clients {
            sync.add_client(client, world.tick());
        }

        let output = world.step(Vec::new(), &mut lifecycle, 33.0);
        let frame = SyncFrame::capture(&world, &output.events);
        for client in clients {
            assert!(matches!(
                sync.prepare(client, &frame, 0, None),
                Some(Packet::FullSnapshot(_))
            ));
        }

        if let Some(entity) = world.get_mut(player) {
            entity.place_at(5050.0, 5000.0);
            if let Some(body) = entity.as_player_mut() {
                body.health = 1.0;
            }
        }
        let output = world.step(Vec::new(), &mut lifecycle, 33.0);
        assert!(world.get(player).unwrap().is_removed());
        assert!(world.get(spike).unwrap().is_active());

        let frame = SyncFrame::capture(&world, &output.events);
        for client in clients {
            let diff = expect_diff(sync.prepare(client, &frame, 0, None));
            assert_eq!(diff.removed_ids, vec![player]);
            assert_eq!(diff.entity(player).unwrap().flags, vec![Flag::Damaged]);
        }

        // Same frame again: the flag and the removal are not repeated.
        for client in clients {
            if let Some(packet) = sync.prepare(client, &frame, 0, None) {
                let diff = expect_diff(Some(packet));
                assert!(diff.removed_ids.is_empty());
                assert!(diff.entity(player).is_none());
            }
        }

        assert_eq!(world.destroy_removed(), vec![player]);
        sync.forget(&[player]);
        let output = world.step(Vec::new(), &mut lifecycle, 33.0);
        let frame = SyncFrame::capture(&world, &output.events);
        for client in clients {
            if let Some(packet) = sync.prepare(client, &frame, 0, None) {
                let diff = expect_diff(Some(packet));
                assert!(diff.entity(player).is_none());
            }
        }
    }

    /// A coin that outlives its lifetime is removed and a replacement is
    /// placed during the same tick.
    #[test]
    fn coin_despawns_after_lifetime_and_respawns_in_same_tick() {
        let mut world = World::new(4000.0, 4000.0);
        let mut lifecycle = LifecycleManager::with_seed(Vec::new(), 16, COIN_DESPAWN_MS, 3);
        let coin = place(&mut world, respawning_coin, 2000.0, 2000.0);

        let output = world.step(Vec::new(), &mut lifecycle, COIN_DESPAWN_MS as f64);
        assert!(output.spawned.is_empty());
        assert!(world.get(coin).unwrap().is_active());

        let output = world.step(Vec::new(), &mut lifecycle, 1000.0);
        assert!(world.get(coin).unwrap().is_removed());
        assert_eq!(output.spawned.len(), 1);
        assert_eq!(world.count_active(EntityKind::Coin), 1);

        world.destroy_removed();
        let output = world.step(Vec::new(), &mut lifecycle, 1000.0);
        assert!(output.spawned.is_empty());
        assert_eq!(world.count_active(EntityKind::Coin), 1);
    }

    /// Velocity is integrated and then halved every tick.
    #[test]
    fn velocity_decays_each_tick() {
        let mut world = World::new(4000.0, 4000.0);
        let mut lifecycle = LifecycleManager::with_seed(Vec::new(), 16, COIN_DESPAWN_MS, 3);
        let spike = place(&mut world, |id| Entity::ice_spike(id, 0), 2000.0, 2000.0);

        if let Some(entity) = world.get_mut(spike) {
            entity.velocity = server::physics::Vec2::new(8.0, 0.0);
        }
        world.step(Vec::new(), &mut lifecycle, 33.0);
        let entity = world.get(spike).unwrap();
        assert_eq!(entity.shape.x, 2008.0);
        assert_eq!(entity.velocity.x, 4.0);

        world.step(Vec::new(), &mut lifecycle, 33.0);
        let entity = world.get(spike).unwrap();
        assert_eq!(entity.shape.x, 2012.0);
        assert_eq!(entity.velocity.x, 2.0);
    }
}

/// SESSION TESTS
mod session_tests {
    use super::*;

    fn config() -> GameConfig {
        let mut config = GameConfig::default();
        config.coins.count = 12;
        config.ice_spikes.count = 3;
        config.seed = Some(21);
        config
    }

    fn key(sequence: u32, key: InputKey, down: bool) -> InputState {
        InputState {
            sequence,
            timestamp: u64::from(sequence),
            input: ClientInput::Key { key, down },
        }
    }

    fn assert_mirrors_match(simulation: &Simulation, game: &ClientGameState) {
        for entity in simulation.world().entities() {
            if !entity.is_active() {
                continue;
            }
            let mirror = game
                .mirror(entity.id)
                .unwrap_or_else(|| panic!("no mirror for entity {}", entity.id));
            for update in entity.state().fields() {
                assert_eq!(
                    mirror.state().get(update.field),
                    Some(&update.value),
                    "entity {} field {:?}",
                    entity.id,
                    update.field
                );
            }
        }
        for mirror in game.mirrors() {
            let alive = simulation
                .world()
                .get(mirror.id())
                .is_some_and(|entity| entity.is_active());
            assert!(alive || mirror.is_removing(), "stale mirror {}", mirror.id());
        }
    }

    /// Applying every packet (twice, to also cover duplicates) keeps each
    /// client's mirrors equal to the authoritative state.
    #[test]
    fn client_mirrors_track_authoritative_state() {
        let stats = Arc::new(MemoryStatsSink::new());
        let mut simulation = Simulation::new(config(), stats).unwrap();
        let alice = simulation.connect("alice", None).unwrap();
        let bob = simulation.connect("bob", None).unwrap();
        let mut games = std::collections::HashMap::new();
        games.insert(alice, ClientGameState::new());
        games.insert(bob, ClientGameState::new());

        let script = [
            (2, key(1, InputKey::Right, true)),
            (3, key(2, InputKey::Down, true)),
            (20, key(3, InputKey::Right, false)),
            (25, key(4, InputKey::SwordSwing, true)),
            (40, key(5, InputKey::SwordSwing, false)),
        ];

        for tick in 1..=90u64 {
            for (at, input) in &script {
                if *at == tick {
                    simulation.queue_input(alice, input.clone());
                }
            }
            if tick == 30 {
                simulation.queue_input(
                    bob,
                    InputState {
                        sequence: 1,
                        timestamp: 30,
                        input: ClientInput::Chat("hello".to_string()),
                    },
                );
            }

            for (client, packet) in simulation.run_tick(33.0) {
                let game = games.get_mut(&client).unwrap();
                apply(game, &packet);
                apply(game, &packet);
            }
            for game in games.values_mut() {
                game.update(33.0, false);
            }

            for (client, game) in &games {
                assert_mirrors_match(&simulation, game);
                assert_eq!(game.self_id(), simulation.entity_of(*client));
            }
        }

        let game = &games[&alice];
        assert_eq!(game.ack(), 5);
        let bob_entity = simulation.entity_of(bob).unwrap();
        assert_eq!(
            game.mirror(bob_entity).unwrap().state().get_str(Field::ChatMessage),
            Some("hello")
        );
    }

    /// A client joining mid-session gets every active entity in its first
    /// message, while existing clients learn about the newcomer through a diff.
    #[test]
    fn late_joiner_receives_full_snapshot() {
        let stats = Arc::new(MemoryStatsSink::new());
        let mut simulation = Simulation::new(config(), stats).unwrap();
        let early = simulation.connect("early", None).unwrap();
        for _ in 0..10 {
            simulation.run_tick(33.0);
        }

        let late = simulation.connect("late", None).unwrap();
        let outgoing = simulation.run_tick(33.0);
        let late_entity = simulation.entity_of(late).unwrap();
        let active = simulation
            .world()
            .entities()
            .iter()
            .filter(|entity| entity.is_active())
            .count();

        for (client, packet) in outgoing {
            match packet {
                Packet::FullSnapshot(snapshot) => {
                    assert_eq!(client, late);
                    assert_eq!(snapshot.entities.len(), active);
                    assert_eq!(snapshot.self_id, Some(late_entity));
                }
                Packet::StateDiff(diff) => {
                    assert_eq!(client, early);
                    let newcomer = diff.entity(late_entity).unwrap();
                    assert_eq!(newcomer.kind, Some(EntityKind::Player));
                }
                other => panic!("unexpected packet {:?}", other),
            }
        }
    }
}

/// LIVE NETWORK TESTS
mod network_tests {
    use super::*;
    use client::network::Client;
    use futures_util::{SinkExt, StreamExt};
    use server::network::Server;
    use shared::PROTOCOL_VERSION;
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::time::{sleep, timeout};
    use tokio_test::assert_ok;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn join(addr: std::net::SocketAddr, name: &str) -> Socket {
        let (mut ws, _) = assert_ok!(connect_async(format!("ws://{}", addr)).await);
        let connect = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            name: name.to_string(),
            account_id: None,
        };
        assert_ok!(ws.send(Message::Binary(connect.to_bytes().unwrap())).await);
        ws
    }

    /// Reads packets until `pick` accepts one.
    async fn wait_for<T>(ws: &mut Socket, mut pick: impl FnMut(Packet) -> Option<T>) -> T {
        timeout(Duration::from_secs(5), async {
            loop {
                let message = ws.next().await.expect("connection closed").unwrap();
                if let Message::Binary(data) = message {
                    if let Some(found) = pick(Packet::from_bytes(&data).unwrap()) {
                        return found;
                    }
                }
            }
        })
        .await
        .expect("timed out waiting for a packet")
    }

    fn snapshot_self(packet: Packet) -> Option<EntityId> {
        match packet {
            Packet::FullSnapshot(snapshot) => snapshot.self_id,
            _ => None,
        }
    }

    /// A client whose socket dies is dropped alone; the others keep getting
    /// diffs and learn that its player is gone.
    #[tokio::test]
    async fn failed_socket_drops_only_that_client() {
        let mut config = GameConfig::default();
        config.coins.count = 4;
        config.ice_spikes.count = 1;
        config.seed = Some(17);

        let mut server = assert_ok!(
            Server::new("127.0.0.1:0", config, Arc::new(MemoryStatsSink::new())).await
        );
        let addr = server.local_addr();
        tokio::spawn(async move { server.run().await });

        let mut watcher = join(addr, "watcher").await;
        wait_for(&mut watcher, snapshot_self).await;

        let mut doomed = join(addr, "doomed").await;
        let doomed_entity = wait_for(&mut doomed, snapshot_self).await;
        wait_for(&mut watcher, |packet| match packet {
            Packet::StateDiff(diff) if diff.entity(doomed_entity).is_some() => Some(()),
            _ => None,
        })
        .await;

        // No close frame: the TCP stream just goes away.
        drop(doomed);

        wait_for(&mut watcher, |packet| match packet {
            Packet::StateDiff(diff) if diff.removed_ids.contains(&doomed_entity) => Some(()),
            _ => None,
        })
        .await;

        let input = Packet::Input(InputState {
            sequence: 1,
            timestamp: 1,
            input: ClientInput::Key {
                key: InputKey::Right,
                down: true,
            },
        });
        assert_ok!(watcher.send(Message::Binary(input.to_bytes().unwrap())).await);
        let ack = wait_for(&mut watcher, |packet| match packet {
            Packet::StateDiff(diff) if diff.ack == 1 => Some(diff.ack),
            _ => None,
        })
        .await;
        assert_eq!(ack, 1);
    }

    /// A headless client plays against a real server, leaves cleanly and its
    /// game is credited to its account.
    #[tokio::test]
    async fn headless_client_session() {
        let mut config = GameConfig::default();
        config.coins.count = 5;
        config.ice_spikes.count = 1;
        config.seed = Some(5);

        let stats = Arc::new(MemoryStatsSink::new());
        let mut server = Server::new("127.0.0.1:0", config, stats.clone())
            .await
            .unwrap();
        let addr = server.local_addr();
        tokio::spawn(async move { server.run().await });

        let mut client = Client::new(&format!("ws://{}", addr), "bot", Some(42));
        client.run(Some(Duration::from_millis(600))).await.unwrap();

        let state = client.game_state();
        assert!(state.has_snapshot());
        assert!(state.len() >= 6);
        assert!(!client.is_connected());

        timeout(Duration::from_secs(5), async {
            while stats.totals(42).is_none() {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("game was never recorded");
        assert!(stats.totals(42).unwrap().games >= 1);
    }
}
