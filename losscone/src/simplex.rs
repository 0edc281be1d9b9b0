//! Nelder-Mead simplex with an absolute parameter and cost tolerance.
//!
//! argmin's own Nelder-Mead stops on the standard deviation of the vertex
//! costs alone, so a simplex sitting on a flat plateau reports convergence
//! before it has moved. [`SimplexSearch`] stops only once every vertex is
//! within `xatol` of the best one in each coordinate and within `fatol` of it
//! in cost.

use argmin::core::{
    CostFunction, Error, IterState, Problem, Solver, TerminationReason, TerminationStatus, KV,
};

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

type SimplexState = IterState<Vec<f64>, (), (), (), (), f64>;

#[derive(Debug, Clone)]
pub struct SimplexSearch {
    /// Vertices with their costs, best first after every step
    vertices: Vec<(Vec<f64>, f64)>,
    xatol: f64,
    fatol: f64,
}

impl SimplexSearch {
    /// `vertices` must hold n + 1 points of dimension n.
    pub fn new(vertices: Vec<Vec<f64>>, xatol: f64, fatol: f64) -> Self {
        Self {
            vertices: vertices.into_iter().map(|v| (v, f64::NAN)).collect(),
            xatol,
            fatol,
        }
    }

    /// Largest coordinate and cost distance of any vertex from the best one.
    pub fn spread(&self) -> (f64, f64) {
        let Some((best, best_cost)) = self.vertices.first() else {
            return (0.0, 0.0);
        };
        self.vertices[1..]
            .iter()
            .fold((0.0_f64, 0.0_f64), |(dx, df), (vertex, cost)| {
                let x = vertex
                    .iter()
                    .zip(best.iter())
                    .fold(0.0_f64, |m, (a, b)| m.max((a - b).abs()));
                (dx.max(x), df.max((cost - best_cost).abs()))
            })
    }

    fn sort(&mut self) {
        self.vertices.sort_by(|a, b| a.1.total_cmp(&b.1));
    }

    /// Centroid of every vertex except the worst.
    fn centroid(&self) -> Vec<f64> {
        let kept = &self.vertices[..self.vertices.len() - 1];
        let dim = kept[0].0.len();
        let mut centroid = vec![0.0; dim];
        for (vertex, _) in kept {
            for (c, x) in centroid.iter_mut().zip(vertex.iter()) {
                *c += x;
            }
        }
        centroid.iter_mut().for_each(|c| *c /= kept.len() as f64);
        centroid
    }

    /// Point `centroid + t * (centroid - worst)`.
    fn along(centroid: &[f64], worst: &[f64], t: f64) -> Vec<f64> {
        centroid
            .iter()
            .zip(worst.iter())
            .map(|(c, w)| c + t * (c - w))
            .collect()
    }

    fn replace_worst(&mut self, vertex: Vec<f64>, cost: f64) {
        if let Some(last) = self.vertices.last_mut() {
            *last = (vertex, cost);
        }
    }

    fn shrink<O>(&mut self, problem: &mut Problem<O>) -> Result<(), Error>
    where
        O: CostFunction<Param = Vec<f64>, Output = f64>,
    {
        let best = self.vertices[0].0.clone();
        for (vertex, cost) in self.vertices.iter_mut().skip(1) {
            for (x, b) in vertex.iter_mut().zip(best.iter()) {
                *x = b + SHRINK * (*x - b);
            }
            *cost = problem.cost(vertex)?;
        }
        Ok(())
    }

    fn best_state(&self, state: SimplexState) -> SimplexState {
        let (best, cost) = &self.vertices[0];
        state.param(best.clone()).cost(*cost)
    }
}

impl<O> Solver<O, SimplexState> for SimplexSearch
where
    O: CostFunction<Param = Vec<f64>, Output = f64>,
{
    const NAME: &'static str = "Simplex search";

    fn init(
        &mut self,
        problem: &mut Problem<O>,
        state: SimplexState,
    ) -> Result<(SimplexState, Option<KV>), Error> {
        let dim = self.vertices.first().map_or(0, |(v, _)| v.len());
        if dim == 0 || self.vertices.len() != dim + 1 {
            return Err(Error::msg(format!(
                "simplex needs n + 1 vertices of dimension n > 0, got {} of dimension {dim}",
                self.vertices.len()
            )));
        }
        for (vertex, cost) in self.vertices.iter_mut() {
            *cost = problem.cost(vertex)?;
        }
        self.sort();
        Ok((self.best_state(state), None))
    }

    fn next_iter(
        &mut self,
        problem: &mut Problem<O>,
        state: SimplexState,
    ) -> Result<(SimplexState, Option<KV>), Error> {
        let n = self.vertices.len();
        let centroid = self.centroid();
        let best_cost = self.vertices[0].1;
        let second_worst_cost = self.vertices[n - 2].1;
        let (worst, worst_cost) = self.vertices[n - 1].clone();

        let reflected = Self::along(&centroid, &worst, REFLECTION);
        let reflected_cost = problem.cost(&reflected)?;

        if reflected_cost < best_cost {
            let expanded = Self::along(&centroid, &worst, REFLECTION * EXPANSION);
            let expanded_cost = problem.cost(&expanded)?;
            if expanded_cost < reflected_cost {
                self.replace_worst(expanded, expanded_cost);
            } else {
                self.replace_worst(reflected, reflected_cost);
            }
        } else if reflected_cost < second_worst_cost {
            self.replace_worst(reflected, reflected_cost);
        } else if reflected_cost < worst_cost {
            let outside = Self::along(&centroid, &worst, CONTRACTION * REFLECTION);
            let outside_cost = problem.cost(&outside)?;
            if outside_cost <= reflected_cost {
                self.replace_worst(outside, outside_cost);
            } else {
                self.shrink(problem)?;
            }
        } else {
            let inside = Self::along(&centroid, &worst, -CONTRACTION);
            let inside_cost = problem.cost(&inside)?;
            if inside_cost < worst_cost {
                self.replace_worst(inside, inside_cost);
            } else {
                self.shrink(problem)?;
            }
        }

        self.sort();
        Ok((self.best_state(state), None))
    }

    fn terminate(&mut self, _state: &SimplexState) -> TerminationStatus {
        let (dx, df) = self.spread();
        if dx <= self.xatol && df <= self.fatol {
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
        } else {
            TerminationStatus::NotTerminated
        }
    }
}
