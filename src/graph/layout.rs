//! Force-directed layout simulation.
//!
//! Velocity-decay stepping with four forces applied in order each tick:
//! a weak spring along every edge, pairwise inverse-distance repulsion,
//! re-centering on the viewport centre, and a fixed-radius collision
//! constraint. Alpha cools from 1 toward `alpha_target`; the simulation is
//! settled once alpha drops below `alpha_min`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::RelationGraph;
use crate::config::LayoutConfig;
use crate::error::{MindOrbitError, Result};

const INITIAL_RADIUS: f64 = 10.0;
const ALPHA_MIN: f64 = 0.001;
const VELOCITY_DECAY: f64 = 0.4;
/// Alpha target while a node is being dragged.
pub const DRAG_ALPHA_TARGET: f64 = 0.3;
/// Squared distance below which repulsion is softened.
const CHARGE_DISTANCE_MIN2: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    pub link_distance: f64,
    pub link_strength: f64,
    pub charge_strength: f64,
    pub collide_radius: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self::from(&LayoutConfig::default())
    }
}

impl From<&LayoutConfig> for LayoutParams {
    fn from(config: &LayoutConfig) -> Self {
        Self {
            link_distance: config.link_distance,
            link_strength: config.link_strength,
            charge_strength: config.charge_strength,
            collide_radius: config.collide_radius,
            width: config.width,
            height: config.height,
        }
    }
}

/// Position of one node after a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone)]
struct Body {
    id: String,
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
    fx: Option<f64>,
    fy: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    source: usize,
    target: usize,
    /// Share of the correction applied to the target, by relative degree.
    bias: f64,
}

/// Iterative force simulation over a relation graph.
#[derive(Debug, Clone)]
pub struct ForceSimulation {
    bodies: Vec<Body>,
    links: Vec<Link>,
    index: HashMap<String, usize>,
    params: LayoutParams,
    alpha: f64,
    alpha_target: f64,
    alpha_decay: f64,
    ticks: u64,
    jiggle_seed: u64,
}

impl ForceSimulation {
    pub fn new(graph: &RelationGraph, params: LayoutParams) -> Self {
        let (cx, cy) = (params.width / 2.0, params.height / 2.0);
        let golden_angle = std::f64::consts::PI * (3.0 - 5f64.sqrt());

        let bodies: Vec<Body> = graph
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let radius = INITIAL_RADIUS * (0.5 + i as f64).sqrt();
                let angle = i as f64 * golden_angle;
                Body {
                    id: node.id.clone(),
                    x: cx + radius * angle.cos(),
                    y: cy + radius * angle.sin(),
                    vx: 0.0,
                    vy: 0.0,
                    fx: None,
                    fy: None,
                }
            })
            .collect();

        let index: HashMap<String, usize> = bodies
            .iter()
            .enumerate()
            .map(|(i, b)| (b.id.clone(), i))
            .collect();

        let endpoints: Vec<(usize, usize)> = graph
            .edges
            .iter()
            .filter_map(|e| Some((*index.get(&e.source)?, *index.get(&e.target)?)))
            .collect();

        let mut degree = vec![0usize; bodies.len()];
        for &(s, t) in &endpoints {
            degree[s] += 1;
            degree[t] += 1;
        }

        let links = endpoints
            .into_iter()
            .map(|(source, target)| Link {
                source,
                target,
                bias: degree[source] as f64 / (degree[source] + degree[target]) as f64,
            })
            .collect();

        Self {
            bodies,
            links,
            index,
            params,
            alpha: 1.0,
            alpha_target: 0.0,
            alpha_decay: 1.0 - ALPHA_MIN.powf(1.0 / 300.0),
            ticks: 0,
            jiggle_seed: 0x2545_f491_4f6c_dd1d,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn node_count(&self) -> usize {
        self.bodies.len()
    }

    /// Cooled below `alpha_min` with nothing holding it warm.
    pub fn is_settled(&self) -> bool {
        self.alpha < ALPHA_MIN
    }

    pub fn set_alpha_target(&mut self, target: f64) {
        self.alpha_target = target.clamp(0.0, 1.0);
    }

    /// Raise alpha back up, e.g. after the graph is perturbed.
    pub fn reheat(&mut self, alpha: f64) {
        self.alpha = alpha.clamp(0.0, 1.0);
    }

    /// Fix a node at a position (drag start / drag move).
    pub fn pin(&mut self, id: &str, x: f64, y: f64) -> Result<()> {
        let idx = self.lookup(id)?;
        self.bodies[idx].fx = Some(x);
        self.bodies[idx].fy = Some(y);
        Ok(())
    }

    /// Release a pinned node back to the forces (drag end).
    pub fn unpin(&mut self, id: &str) -> Result<()> {
        let idx = self.lookup(id)?;
        self.bodies[idx].fx = None;
        self.bodies[idx].fy = None;
        Ok(())
    }

    fn lookup(&self, id: &str) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| MindOrbitError::ItemNotFound(id.to_string()))
    }

    /// Advance the simulation by one step.
    pub fn tick(&mut self) {
        self.alpha += (self.alpha_target - self.alpha) * self.alpha_decay;

        self.apply_links();
        self.apply_charge();
        self.apply_center();
        self.apply_collide();

        for body in &mut self.bodies {
            match body.fx {
                Some(fx) => {
                    body.x = fx;
                    body.vx = 0.0;
                }
                None => {
                    body.vx *= 1.0 - VELOCITY_DECAY;
                    body.x += body.vx;
                }
            }
            match body.fy {
                Some(fy) => {
                    body.y = fy;
                    body.vy = 0.0;
                }
                None => {
                    body.vy *= 1.0 - VELOCITY_DECAY;
                    body.y += body.vy;
                }
            }
        }

        self.ticks += 1;
    }

    /// Tick until settled or `max_ticks` is reached; returns ticks run.
    pub fn settle(&mut self, max_ticks: usize) -> usize {
        let mut run = 0;
        while run < max_ticks && !self.is_settled() {
            self.tick();
            run += 1;
        }
        run
    }

    pub fn positions(&self) -> Vec<NodePosition> {
        self.bodies
            .iter()
            .map(|b| NodePosition {
                id: b.id.clone(),
                x: b.x,
                y: b.y,
            })
            .collect()
    }

    /// Tiny deterministic offset used to separate coincident nodes.
    fn jiggle(&mut self) -> f64 {
        self.jiggle_seed ^= self.jiggle_seed << 13;
        self.jiggle_seed ^= self.jiggle_seed >> 7;
        self.jiggle_seed ^= self.jiggle_seed << 17;
        ((self.jiggle_seed >> 11) as f64 / (1u64 << 53) as f64 - 0.5) * 1e-6
    }

    fn apply_links(&mut self) {
        let strength = self.params.link_strength;
        let distance = self.params.link_distance;

        for k in 0..self.links.len() {
            let Link { source, target, bias } = self.links[k];
            let (s, t) = (&self.bodies[source], &self.bodies[target]);
            let mut x = t.x + t.vx - s.x - s.vx;
            let mut y = t.y + t.vy - s.y - s.vy;
            if x == 0.0 {
                x = self.jiggle();
            }
            if y == 0.0 {
                y = self.jiggle();
            }
            let len = (x * x + y * y).sqrt();
            let l = (len - distance) / len * self.alpha * strength;
            x *= l;
            y *= l;

            let t = &mut self.bodies[target];
            t.vx -= x * bias;
            t.vy -= y * bias;
            let s = &mut self.bodies[source];
            s.vx += x * (1.0 - bias);
            s.vy += y * (1.0 - bias);
        }
    }

    fn apply_charge(&mut self) {
        let n = self.bodies.len();
        let strength = self.params.charge_strength * self.alpha;

        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let mut x = self.bodies[j].x - self.bodies[i].x;
                let mut y = self.bodies[j].y - self.bodies[i].y;
                let mut l = x * x + y * y;
                if x == 0.0 {
                    x = self.jiggle();
                    l += x * x;
                }
                if y == 0.0 {
                    y = self.jiggle();
                    l += y * y;
                }
                if l < CHARGE_DISTANCE_MIN2 {
                    l = (CHARGE_DISTANCE_MIN2 * l).sqrt();
                }
                let body = &mut self.bodies[i];
                body.vx += x * strength / l;
                body.vy += y * strength / l;
            }
        }
    }

    fn apply_center(&mut self) {
        let n = self.bodies.len();
        if n == 0 {
            return;
        }
        let (cx, cy) = (self.params.width / 2.0, self.params.height / 2.0);
        let sx = self.bodies.iter().map(|b| b.x).sum::<f64>() / n as f64 - cx;
        let sy = self.bodies.iter().map(|b| b.y).sum::<f64>() / n as f64 - cy;
        for body in &mut self.bodies {
            body.x -= sx;
            body.y -= sy;
        }
    }

    fn apply_collide(&mut self) {
        let r = self.params.collide_radius * 2.0;
        if r <= 0.0 {
            return;
        }
        let n = self.bodies.len();

        for i in 0..n {
            let xi = self.bodies[i].x + self.bodies[i].vx;
            let yi = self.bodies[i].y + self.bodies[i].vy;
            for j in i + 1..n {
                let other = &self.bodies[j];
                let mut x = xi - other.x - other.vx;
                let mut y = yi - other.y - other.vy;
                let mut l = x * x + y * y;
                if l >= r * r {
                    continue;
                }
                if x == 0.0 {
                    x = self.jiggle();
                    l += x * x;
                }
                if y == 0.0 {
                    y = self.jiggle();
                    l += y * y;
                }
                let len = l.sqrt();
                let push = (r - len) / len;
                // Equal radii split the correction evenly.
                x *= push * 0.5;
                y *= push * 0.5;

                self.bodies[i].vx += x;
                self.bodies[i].vy += y;
                self.bodies[j].vx -= x;
                self.bodies[j].vy -= y;
            }
        }
    }
}
