//! Property-based tests for hierarchy resolution, aggregation and engine decisions.
//!
//! Graphs are drawn from a small fixed role pool so edges collide often and cycles are
//! common.

#[cfg(test)]
mod tests {
    use crate::{
        conditions::OriginRule,
        context::AccessContext,
        core::AccessEngine,
        effective::PermissionAggregator,
        hierarchy::RoleGraph,
        permission::{Permission, Scope},
        role::{HierarchyEdge, Role, RoleAssignment, RolePermission},
        storage::MemoryStore,
    };
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::net::{IpAddr, Ipv4Addr};

    const ROLE_POOL: usize = 8;

    fn role_name(i: usize) -> String {
        format!("ROLE_{i}")
    }

    fn role_id(i: usize) -> String {
        format!("r-{i}")
    }

    fn roles_strategy() -> impl Strategy<Value = Vec<Role>> {
        prop::collection::vec((0i32..50, prop::bool::weighted(0.85)), ROLE_POOL).prop_map(
            |specs| {
                specs
                    .into_iter()
                    .enumerate()
                    .map(|(i, (level, active))| {
                        Role::with_id(role_id(i), role_name(i), level).with_active(active)
                    })
                    .collect()
            },
        )
    }

    /// Arbitrary edges, cycles and self-loops included.
    fn edges_strategy() -> impl Strategy<Value = Vec<HierarchyEdge>> {
        prop::collection::vec((0..ROLE_POOL, 0..ROLE_POOL), 0..16).prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(child, parent)| HierarchyEdge::new(role_name(child), role_name(parent)))
                .collect()
        })
    }

    fn direct_strategy() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(0..ROLE_POOL, 0..5)
            .prop_map(|indices| indices.into_iter().map(role_name).collect())
    }

    fn grants_strategy() -> impl Strategy<Value = Vec<RolePermission>> {
        let resource = prop_oneof![Just("DEVICES"), Just("REPORTS"), Just("PROJECTS")];
        let action = prop_oneof![Just("READ"), Just("UPDATE"), Just("MANAGE")];
        let scope = prop_oneof![
            Just(Scope::User),
            Just(Scope::Team),
            Just(Scope::Region),
            Just(Scope::Organization),
        ];
        prop::collection::vec((0..ROLE_POOL, resource, action, scope), 0..24).prop_map(|specs| {
            specs
                .into_iter()
                .map(|(role, resource, action, scope)| {
                    RolePermission::new(role_id(role), Permission::new(resource, action, scope))
                })
                .collect()
        })
    }

    fn active_names(roles: &[Role], names: &[String]) -> BTreeSet<String> {
        names
            .iter()
            .filter(|name| roles.iter().any(|r| r.name() == name.as_str() && r.is_active()))
            .cloned()
            .collect()
    }

    proptest! {
        #[test]
        fn prop_resolution_is_superset_of_active_input(
            roles in roles_strategy(),
            edges in edges_strategy(),
            direct in direct_strategy(),
        ) {
            let graph = RoleGraph::new(roles.clone(), edges, 16);
            let resolved = graph.resolve(direct.iter().map(String::as_str));
            prop_assert!(resolved.is_superset(&active_names(&roles, &direct)));
        }

        #[test]
        fn prop_resolution_is_closed_under_inheritance(
            roles in roles_strategy(),
            edges in edges_strategy(),
            direct in direct_strategy(),
        ) {
            let graph = RoleGraph::new(roles, edges, 16);
            let resolved = graph.resolve(direct.iter().map(String::as_str));

            // Expanding again adds nothing
            prop_assert_eq!(&graph.resolve(resolved.iter().map(String::as_str)), &resolved);

            for name in &resolved {
                for parent in graph.parents_of(name) {
                    if graph.role_by_name(parent).is_some_and(Role::is_active) {
                        prop_assert!(resolved.contains(parent));
                    }
                }
            }
        }

        #[test]
        fn prop_resolution_is_order_independent(
            roles in roles_strategy(),
            edges in edges_strategy(),
            direct in direct_strategy(),
        ) {
            let graph = RoleGraph::new(roles, edges, 16);
            let forward = graph.resolve(direct.iter().map(String::as_str));
            let backward = graph.resolve(direct.iter().rev().map(String::as_str));
            prop_assert_eq!(forward, backward);
        }

        #[test]
        fn prop_resolution_is_order_independent_under_depth_cap(
            roles in roles_strategy(),
            edges in edges_strategy(),
            direct in direct_strategy(),
            max_depth in 0usize..4,
        ) {
            let graph = RoleGraph::new(roles, edges, max_depth);
            let forward = graph.resolve(direct.iter().map(String::as_str));
            let backward = graph.resolve(direct.iter().rev().map(String::as_str));
            prop_assert_eq!(forward, backward);
        }

        #[test]
        fn prop_aggregation_is_deduplicated_and_ordered(
            roles in roles_strategy(),
            edges in edges_strategy(),
            direct in direct_strategy(),
            grants in grants_strategy(),
        ) {
            let graph = RoleGraph::new(roles, edges, 16);
            let resolved = graph.resolve(direct.iter().map(String::as_str));
            let permissions = PermissionAggregator::default().aggregate(&graph, &resolved, &grants);

            let keys: BTreeSet<_> = permissions.iter().map(|p| p.permission.dedup_key()).collect();
            prop_assert_eq!(keys.len(), permissions.len());
            prop_assert!(permissions.windows(2).all(|w| w[0].role_level >= w[1].role_level));
            prop_assert!(permissions.iter().all(|p| resolved.contains(&p.granted_by)));
        }

        #[test]
        fn prop_aggregation_is_monotonic_in_roles(
            roles in roles_strategy(),
            edges in edges_strategy(),
            direct in direct_strategy(),
            extra in 0..ROLE_POOL,
            grants in grants_strategy(),
        ) {
            let graph = RoleGraph::new(roles, edges, 16);
            let aggregator = PermissionAggregator::default();

            let before = graph.resolve(direct.iter().map(String::as_str));
            let mut widened = direct.clone();
            widened.push(role_name(extra));
            let after = graph.resolve(widened.iter().map(String::as_str));
            prop_assert!(after.is_superset(&before));

            let keys_before: BTreeSet<_> = aggregator
                .aggregate(&graph, &before, &grants)
                .iter()
                .map(|p| p.permission.dedup_key())
                .collect();
            let keys_after: BTreeSet<_> = aggregator
                .aggregate(&graph, &after, &grants)
                .iter()
                .map(|p| p.permission.dedup_key())
                .collect();
            prop_assert!(keys_after.is_superset(&keys_before));
        }

        #[test]
        fn prop_network_rule_allows_its_own_base(octets in any::<[u8; 4]>(), prefix in 0u8..=32) {
            let base = IpAddr::V4(Ipv4Addr::from(octets));
            let rule = OriginRule::Network { base, prefix };
            prop_assert!(rule.allows(base));
            let any = OriginRule::Network { base, prefix: 0 };
            prop_assert!(any.allows(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_granting_a_role_never_revokes_access(
            roles in roles_strategy(),
            edges in edges_strategy(),
            direct in direct_strategy(),
            extra in 0..ROLE_POOL,
            grants in grants_strategy(),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let store = MemoryStore::new();
            for role in roles {
                store.upsert_role(role);
            }
            for edge in edges {
                store.add_edge(&edge.child, &edge.parent);
            }
            for grant in grants {
                store.grant_permission(&grant.role_id, grant.permission);
            }
            for name in &direct {
                let index: usize = name.trim_start_matches("ROLE_").parse().unwrap();
                store.assign_role(RoleAssignment::new("alice", role_id(index)).in_team("T1"));
            }

            let engine = AccessEngine::new(store.clone(), Default::default()).unwrap();
            let ctx = AccessContext::new().team("T1");
            let requests = [
                ("DEVICES", "READ"),
                ("DEVICES", "UPDATE"),
                ("REPORTS", "READ"),
                ("PROJECTS", "UPDATE"),
            ];

            let before = runtime.block_on(engine.check_permissions("alice", &requests, &ctx));
            store.assign_role(RoleAssignment::new("alice", role_id(extra)).in_team("T1"));
            engine.invalidate_cache("alice");
            let after = runtime.block_on(engine.check_permissions("alice", &requests, &ctx));

            for (old, new) in before.iter().zip(&after) {
                prop_assert!(!old.allowed || new.allowed);
            }
        }
    }
}
