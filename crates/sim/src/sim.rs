use std::net::Ipv4Addr;

use anyhow::Result;
use rand::Rng;

use quadron::{Entity, Identifier, Node, NodeConfig, Position};

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub nodes: usize,
    pub width: i64,
    pub height: i64,
    pub aoi_radius: i64,
}

/// A set of overlay nodes whose entities walk randomly inside a bounded
/// region, bouncing off the borders. Node 0 is the observer: the TUI draws
/// what it sees through the overlay next to the true positions.
pub struct Simulation {
    config: SimConfig,
    nodes: Vec<Node>,
    headings: Vec<(i64, i64)>,
}

impl Simulation {
    /// Starts all nodes on loopback, chain-joining each one through its
    /// predecessor.
    pub fn start(config: SimConfig) -> Result<Self> {
        let mut rng = rand::thread_rng();
        let mut nodes: Vec<Node> = Vec::with_capacity(config.nodes);
        let mut headings = Vec::with_capacity(config.nodes);

        for i in 0..config.nodes {
            let position = Position::new(
                rng.gen_range(10..config.width - 10),
                rng.gen_range(10..config.height - 10),
            );
            let entity = Entity::new(
                Identifier::new(Ipv4Addr::LOCALHOST, 0),
                position,
                config.aoi_radius,
            );

            let bootstrap = if i == 0 {
                None
            } else {
                Some(nodes[i - 1].identifier())
            };

            let mut node = Node::new(entity, NodeConfig::default());
            node.join(bootstrap)?;
            log::info!("node {} up at {}", i, node.identifier());

            nodes.push(node);
            headings.push((
                if rng.gen_bool(0.5) { 1 } else { -1 },
                if rng.gen_bool(0.5) { 1 } else { -1 },
            ));
        }

        Ok(Self {
            config,
            nodes,
            headings,
        })
    }

    /// Advances every entity one step.
    pub fn step(&mut self) {
        for (node, heading) in self.nodes.iter().zip(self.headings.iter_mut()) {
            let position = node.local_entity().position;
            let (mut x, mut y) = (position.x(), position.y());

            if x <= 1 || x >= self.config.width - 1 {
                heading.0 = -heading.0;
            }
            if y <= 1 || y >= self.config.height - 1 {
                heading.1 = -heading.1;
            }

            x += heading.0;
            y += heading.1;
            node.move_to(x, y);
        }
    }

    pub fn observer(&self) -> Entity {
        self.nodes[0].local_entity()
    }

    /// True positions of every entity except the observer.
    pub fn entity_positions(&self) -> Vec<(f64, f64)> {
        self.nodes[1..]
            .iter()
            .map(|node| {
                let position = node.local_entity().position;
                (position.x() as f64, position.y() as f64)
            })
            .collect()
    }

    /// Positions of the entities the observer currently sees through the
    /// overlay, as last advertised to it.
    pub fn observed_positions(&self) -> Vec<(f64, f64)> {
        self.nodes[0]
            .entities_in_aoi()
            .iter()
            .map(|entity| (entity.position.x() as f64, entity.position.y() as f64))
            .collect()
    }

    pub fn observed_count(&self) -> usize {
        self.nodes[0].entities_in_aoi().len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn width(&self) -> f64 {
        self.config.width as f64
    }

    pub fn height(&self) -> f64 {
        self.config.height as f64
    }
}
