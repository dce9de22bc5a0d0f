//! Dependency graph over service descriptors and its start order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::descriptor::ServiceDescriptor;
use crate::error::GraphError;

/// Validated set of descriptors plus the derived `dependency -> dependent` edges.
///
/// Construction fails closed: a graph with a cycle or a dangling reference is
/// never returned, so holding a `ServiceGraph` means `linear_ordering` is valid.
#[derive(Debug, Clone)]
pub struct ServiceGraph {
    descriptors: Vec<ServiceDescriptor>,
    // dependents[i] = indices of services that depend on descriptors[i]
    dependents: Vec<Vec<usize>>,
    dependencies: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl ServiceGraph {
    pub fn build(descriptors: Vec<ServiceDescriptor>) -> Result<Self, GraphError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(descriptors.len());
        for (i, descriptor) in descriptors.iter().enumerate() {
            if index.insert(descriptor.name.as_str(), i).is_some() {
                return Err(GraphError::DuplicateService(descriptor.name.clone()));
            }
        }

        let mut dependents = vec![Vec::new(); descriptors.len()];
        let mut dependencies = vec![Vec::new(); descriptors.len()];
        for (i, descriptor) in descriptors.iter().enumerate() {
            for dependency in &descriptor.depends_on {
                let &dep = index.get(dependency.as_str()).ok_or_else(|| {
                    GraphError::UnresolvedDependency {
                        service: descriptor.name.clone(),
                        dependency: dependency.clone(),
                    }
                })?;

                // Repeated entries in depends_on collapse to one edge.
                if !dependencies[i].contains(&dep) {
                    dependencies[i].push(dep);
                    dependents[dep].push(i);
                }
            }
        }

        let order = topological_order(&dependencies, &dependents).map_err(|remaining| {
            GraphError::CycleDetected {
                services: remaining
                    .into_iter()
                    .map(|i| descriptors[i].name.clone())
                    .collect(),
            }
        })?;

        log::debug!(
            "Resolved service order: {}",
            order
                .iter()
                .map(|&i| descriptors[i].name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        drop(index);
        Ok(Self {
            descriptors,
            dependents,
            dependencies,
            order,
        })
    }

    /// Service names such that every dependency precedes its dependents.
    pub fn linear_ordering(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&i| self.descriptors[i].name.as_str())
            .collect()
    }

    /// Descriptors in start order.
    pub fn ordered_descriptors(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.order.iter().map(move |&i| &self.descriptors[i])
    }

    pub fn descriptor(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, &self.dependencies)
    }

    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, &self.dependents)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    fn neighbours<'a>(&'a self, name: &str, edges: &'a [Vec<usize>]) -> Vec<&'a str> {
        self.descriptors
            .iter()
            .position(|d| d.name == name)
            .map(|i| {
                edges[i]
                    .iter()
                    .map(|&j| self.descriptors[j].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Kahn's algorithm. Among simultaneously eligible services the one declared
/// first wins, so the order is stable across runs. On a cycle, returns the
/// indices that could not be ordered, in declaration order.
fn topological_order(
    dependencies: &[Vec<usize>],
    dependents: &[Vec<usize>],
) -> Result<Vec<usize>, Vec<usize>> {
    let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(Reverse(next)) = ready.pop() {
        order.push(next);
        for &dependent in &dependents[next] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() == in_degree.len() {
        Ok(order)
    } else {
        Err(in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &degree)| degree > 0)
            .map(|(i, _)| i)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::HandlerRef;

    fn svc(name: &str, deps: &[&str]) -> ServiceDescriptor {
        deps.iter().fold(
            ServiceDescriptor::new(name, HandlerRef::new("test", "noop")),
            |d, dep| d.depends_on(*dep),
        )
    }

    #[test]
    fn independent_services_keep_declaration_order() {
        let graph = ServiceGraph::build(vec![svc("c", &[]), svc("a", &[]), svc("b", &[])]).unwrap();
        assert_eq!(graph.linear_ordering(), vec!["c", "a", "b"]);
    }

    #[test]
    fn dependency_is_started_before_dependent() {
        let graph = ServiceGraph::build(vec![svc("api", &["db"]), svc("db", &[])]).unwrap();
        assert_eq!(graph.linear_ordering(), vec!["db", "api"]);
        assert_eq!(graph.dependents_of("db"), vec!["api"]);
        assert_eq!(graph.dependencies_of("api"), vec!["db"]);
    }

    #[test]
    fn tie_break_prefers_earlier_declaration_once_unblocked() {
        // x becomes eligible after z; y is eligible from the start but declared after x.
        let graph = ServiceGraph::build(vec![
            svc("x", &["z"]),
            svc("y", &[]),
            svc("z", &[]),
        ])
        .unwrap();
        assert_eq!(graph.linear_ordering(), vec!["y", "z", "x"]);
    }

    #[test]
    fn diamond_orders_every_edge() {
        let graph = ServiceGraph::build(vec![
            svc("api", &["cache", "db"]),
            svc("cache", &["db"]),
            svc("db", &[]),
            svc("metrics", &[]),
        ])
        .unwrap();
        assert_eq!(graph.linear_ordering(), vec!["db", "cache", "api", "metrics"]);
    }

    #[test]
    fn duplicate_dependency_entries_are_one_edge() {
        let graph = ServiceGraph::build(vec![svc("db", &[]), svc("api", &["db", "db"])]).unwrap();
        assert_eq!(graph.dependents_of("db"), vec!["api"]);
        assert_eq!(graph.linear_ordering(), vec!["db", "api"]);
    }

    #[test]
    fn two_node_cycle_fails_without_order() {
        let err = ServiceGraph::build(vec![svc("a", &["b"]), svc("b", &["a"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::CycleDetected {
                services: vec!["a".to_string(), "b".to_string()]
            }
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = ServiceGraph::build(vec![svc("a", &["a"])]).unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected { .. }));
    }

    #[test]
    fn cycle_report_excludes_services_outside_it() {
        let err = ServiceGraph::build(vec![
            svc("db", &[]),
            svc("a", &["db", "c"]),
            svc("c", &["a"]),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            GraphError::CycleDetected {
                services: vec!["a".to_string(), "c".to_string()]
            }
        );
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = ServiceGraph::build(vec![svc("api", &["db"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnresolvedDependency {
                service: "api".to_string(),
                dependency: "db".to_string(),
            }
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = ServiceGraph::build(vec![svc("db", &[]), svc("db", &[])]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateService("db".to_string()));
    }

    #[test]
    fn empty_graph_has_empty_order() {
        let graph = ServiceGraph::build(Vec::new()).unwrap();
        assert!(graph.is_empty());
        assert!(graph.linear_ordering().is_empty());
    }
}
