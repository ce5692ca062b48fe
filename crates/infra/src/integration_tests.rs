//! End-to-end tests for the approval path against the in-memory backends.
//!
//! Verifies:
//! - Stock settles exactly once per approved request and never goes negative
//! - Outbound approvals on one item are serialized (lease + row lock)
//! - Every committed mutation leaves exactly one audit entry
//! - Failures leave no partial state and never leak a lease

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use proptest::prelude::*;

    use warehousex_auth::{Reviewer, Role, RolePolicy, User};
    use warehousex_core::{ItemId, RequestId};
    use warehousex_inventory::InventoryItem;
    use warehousex_requests::{Request, RequestStatus, RequestType};

    use crate::approval::{ApprovalCoordinator, ListRequests, MAX_PAGE_LIMIT, NewRequest};
    use crate::audit::{AuditAction, AuditEntry, ENTITY_INVENTORY, ENTITY_REQUEST};
    use crate::error::ApprovalError;
    use crate::lock::{CoordinationLock, DEFAULT_LEASE_TTL, InMemoryLock};
    use crate::store::in_memory::InMemoryTransaction;
    use crate::store::{
        InMemoryStore, RequestDetails, RequestFilter, Store, StoreError, StoreTransaction,
    };

    type Coordinator = ApprovalCoordinator<InMemoryStore, InMemoryLock>;

    struct Fixture {
        coordinator: Arc<Coordinator>,
        store: InMemoryStore,
        locks: Arc<InMemoryLock>,
        staff: User,
        supervisor: User,
        admin: User,
    }

    impl Fixture {
        fn new() -> Self {
            warehousex_observability::init_for_tests();

            let store = InMemoryStore::new();
            let locks = Arc::new(InMemoryLock::new(DEFAULT_LEASE_TTL));
            let staff = User::new("Sam Staff", "sam@warehouse.test", Role::STAFF);
            let supervisor = User::new("Sue Supervisor", "sue@warehouse.test", Role::SUPERVISOR);
            let admin = User::new("Ada Admin", "ada@warehouse.test", Role::ADMIN);
            for user in [&staff, &supervisor, &admin] {
                store.insert_user(user.clone()).unwrap();
            }

            let coordinator = Arc::new(ApprovalCoordinator::new(
                store.clone(),
                Arc::clone(&locks),
                RolePolicy::default(),
            ));

            Self {
                coordinator,
                store,
                locks,
                staff,
                supervisor,
                admin,
            }
        }

        fn item(&self, quantity: i64) -> InventoryItem {
            let sku = format!("SKU-{}", ItemId::new());
            let item = InventoryItem::new("Forklift battery", sku, quantity, Utc::now()).unwrap();
            self.store.insert_item(item.clone()).unwrap();
            item
        }

        async fn inbound(&self, item: &InventoryItem, quantity: i64) -> RequestDetails {
            self.coordinator
                .create_inbound_request(NewRequest::new(item.id, quantity, ""), self.staff.id)
                .await
                .unwrap()
        }

        async fn outbound(&self, item: &InventoryItem, quantity: i64) -> RequestDetails {
            self.coordinator
                .create_outbound_request(NewRequest::new(item.id, quantity, "dock 4"), self.staff.id)
                .await
                .unwrap()
        }

        fn quantity(&self, item: &InventoryItem) -> i64 {
            self.store.item(item.id).unwrap().quantity
        }

        fn entries(&self, action: AuditAction) -> Vec<AuditEntry> {
            self.store
                .audit_entries()
                .into_iter()
                .filter(|e| e.action == action)
                .collect()
        }
    }

    fn reviewer(user: &User) -> Reviewer {
        Reviewer::new(user.id, user.role.clone())
    }

    #[tokio::test]
    async fn outbound_approval_deducts_stock_and_records_audit() {
        let fx = Fixture::new();
        let item = fx.item(100);
        let created = fx.outbound(&item, 60).await;

        let done = fx
            .coordinator
            .approve_request(created.request.id, &reviewer(&fx.supervisor))
            .await
            .unwrap();

        assert_eq!(done.request.status, RequestStatus::Completed);
        assert_eq!(done.request.approved_by, Some(fx.supervisor.id));
        assert_eq!(done.item.quantity, 40);
        assert_eq!(done.item.version, 2);
        assert_eq!(done.creator.as_ref().map(|u| u.id), Some(fx.staff.id));
        assert_eq!(done.approver.as_ref().map(|u| u.id), Some(fx.supervisor.id));

        let entries = fx.entries(AuditAction::OutboundApproved);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entity, ENTITY_INVENTORY);
        assert_eq!(entries[0].user_id, fx.supervisor.id);
        assert_eq!(entries[0].before.as_ref().unwrap()["quantity"], 100);
        assert_eq!(entries[0].after.as_ref().unwrap()["quantity"], 40);
        assert!(!fx.locks.is_held(item.id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_outbound_approvals_settle_once() {
        let fx = Fixture::new();
        let item = fx.item(40);
        let first = fx.outbound(&item, 30).await;
        let second = fx.outbound(&item, 30).await;

        let a = {
            let coordinator = Arc::clone(&fx.coordinator);
            let who = reviewer(&fx.supervisor);
            tokio::spawn(async move { coordinator.approve_request(first.request.id, &who).await })
        };
        let b = {
            let coordinator = Arc::clone(&fx.coordinator);
            let who = reviewer(&fx.admin);
            tokio::spawn(async move { coordinator.approve_request(second.request.id, &who).await })
        };
        let outcomes = [a.await.unwrap(), b.await.unwrap()];

        let winners = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(winners, 1);
        let loser = outcomes.iter().find_map(|o| o.as_ref().err()).unwrap();
        assert!(
            matches!(loser, ApprovalError::InsufficientStock { .. } | ApprovalError::Conflict(_)),
            "unexpected loser outcome: {loser:?}"
        );

        assert_eq!(fx.quantity(&item), 10);
        assert_eq!(fx.entries(AuditAction::OutboundApproved).len(), 1);
        assert!(!fx.locks.is_held(item.id));
    }

    #[tokio::test]
    async fn inbound_approval_adds_stock() {
        let fx = Fixture::new();
        let item = fx.item(10);
        let created = fx.inbound(&item, 50).await;

        let done = fx
            .coordinator
            .approve_request(created.request.id, &reviewer(&fx.admin))
            .await
            .unwrap();

        assert_eq!(done.item.quantity, 60);
        assert_eq!(done.item.version, 2);
        assert_eq!(done.request.status, RequestStatus::Completed);
        assert_eq!(fx.entries(AuditAction::InboundApproved).len(), 1);
    }

    #[tokio::test]
    async fn self_approval_is_denied_and_changes_nothing() {
        let fx = Fixture::new();
        let item = fx.item(10);
        let created = fx
            .coordinator
            .create_inbound_request(NewRequest::new(item.id, 5, ""), fx.supervisor.id)
            .await
            .unwrap();
        let audit_before = fx.store.audit_entries().len();

        let err = fx
            .coordinator
            .approve_request(created.request.id, &reviewer(&fx.supervisor))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "permission_denied");
        assert_eq!(fx.quantity(&item), 10);
        assert_eq!(
            fx.store.request(created.request.id).unwrap().status,
            RequestStatus::Pending
        );
        assert_eq!(fx.store.audit_entries().len(), audit_before);
    }

    #[tokio::test]
    async fn rejected_request_cannot_be_approved() {
        let fx = Fixture::new();
        let item = fx.item(10);
        let created = fx.outbound(&item, 5).await;

        let rejected = fx
            .coordinator
            .reject_request(created.request.id, &reviewer(&fx.supervisor))
            .await
            .unwrap();
        assert_eq!(rejected.request.status, RequestStatus::Rejected);
        assert_eq!(rejected.request.approved_by, Some(fx.supervisor.id));

        let err = fx
            .coordinator
            .approve_request(created.request.id, &reviewer(&fx.admin))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_transition");

        let entries = fx.entries(AuditAction::Rejected);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entity, ENTITY_REQUEST);
        assert_eq!(entries[0].after.as_ref().unwrap()["status"], "REJECTED");
        assert_eq!(fx.quantity(&item), 10);
    }

    #[tokio::test]
    async fn held_lease_yields_conflict_without_touching_state() {
        let fx = Fixture::new();
        let item = fx.item(50);
        let created = fx.outbound(&item, 5).await;
        let foreign = fx.locks.acquire(item.id).await.unwrap();
        let audit_before = fx.store.audit_entries().len();

        let err = fx
            .coordinator
            .approve_request(created.request.id, &reviewer(&fx.supervisor))
            .await
            .unwrap_err();

        assert!(matches!(err, ApprovalError::Conflict(_)));
        assert!(err.is_retryable());
        assert_eq!(fx.quantity(&item), 50);
        assert_eq!(fx.store.audit_entries().len(), audit_before);
        assert_eq!(
            fx.store.request(created.request.id).unwrap().status,
            RequestStatus::Pending
        );

        assert!(fx.locks.release(&foreign).await.unwrap());
        fx.coordinator
            .approve_request(created.request.id, &reviewer(&fx.supervisor))
            .await
            .unwrap();
        assert_eq!(fx.quantity(&item), 45);
    }

    #[tokio::test]
    async fn lease_is_released_after_insufficient_stock() {
        let fx = Fixture::new();
        let item = fx.item(10);
        let first = fx.outbound(&item, 8).await;
        let second = fx.outbound(&item, 8).await;

        fx.coordinator
            .approve_request(first.request.id, &reviewer(&fx.supervisor))
            .await
            .unwrap();
        let err = fx
            .coordinator
            .approve_request(second.request.id, &reviewer(&fx.supervisor))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ApprovalError::InsufficientStock {
                available: 2,
                requested: 8
            }
        ));
        assert!(!fx.locks.is_held(item.id));
        assert_eq!(
            fx.store.request(second.request.id).unwrap().status,
            RequestStatus::Pending
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_request_settles_at_most_once() {
        let fx = Fixture::new();
        let item = fx.item(0);
        let created = fx.inbound(&item, 7).await;

        let handles: Vec<_> = [&fx.supervisor, &fx.admin]
            .into_iter()
            .map(|user| {
                let coordinator = Arc::clone(&fx.coordinator);
                let who = reviewer(user);
                let id = created.request.id;
                tokio::spawn(async move { coordinator.approve_request(id, &who).await })
            })
            .collect();

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert_eq!(e.code(), "invalid_transition"),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(fx.quantity(&item), 7);
        assert_eq!(fx.entries(AuditAction::InboundApproved).len(), 1);
    }

    #[tokio::test]
    async fn rejection_racing_approval_cannot_both_win() {
        let fx = Fixture::new();
        let item = fx.item(20);
        let created = fx.outbound(&item, 5).await;

        let approver = reviewer(&fx.supervisor);
        let rejecter = reviewer(&fx.admin);
        let approve = fx
            .coordinator
            .approve_request(created.request.id, &approver);
        let reject = fx
            .coordinator
            .reject_request(created.request.id, &rejecter);
        let (approved, rejected) = tokio::join!(approve, reject);

        assert!(approved.is_ok() != rejected.is_ok());
        let status = fx.store.request(created.request.id).unwrap().status;
        if approved.is_ok() {
            assert_eq!(status, RequestStatus::Completed);
            assert_eq!(fx.quantity(&item), 15);
        } else {
            assert_eq!(status, RequestStatus::Rejected);
            assert_eq!(fx.quantity(&item), 20);
        }
    }

    #[tokio::test]
    async fn only_reviewer_roles_may_approve_or_reject() {
        let fx = Fixture::new();
        let item = fx.item(20);
        let created = fx.outbound(&item, 5).await;
        let auditor = Reviewer::new(fx.admin.id, Role::AUDITOR);

        for who in [reviewer(&fx.staff), auditor] {
            let err = fx
                .coordinator
                .approve_request(created.request.id, &who)
                .await
                .unwrap_err();
            assert_eq!(err.code(), "permission_denied");
            let err = fx
                .coordinator
                .reject_request(created.request.id, &who)
                .await
                .unwrap_err();
            assert_eq!(err.code(), "permission_denied");
        }
    }

    #[tokio::test]
    async fn creators_may_reject_their_own_requests() {
        let fx = Fixture::new();
        let item = fx.item(20);
        let created = fx
            .coordinator
            .create_outbound_request(NewRequest::new(item.id, 5, ""), fx.supervisor.id)
            .await
            .unwrap();

        let rejected = fx
            .coordinator
            .reject_request(created.request.id, &reviewer(&fx.supervisor))
            .await
            .unwrap();
        assert_eq!(rejected.request.status, RequestStatus::Rejected);
    }

    #[tokio::test]
    async fn submission_validates_before_persisting() {
        let fx = Fixture::new();
        let item = fx.item(5);

        let bad_id = NewRequest {
            item_id: "pallet-42".into(),
            quantity: 1,
            notes: String::new(),
        };
        let err = fx
            .coordinator
            .create_inbound_request(bad_id, fx.staff.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let err = fx
            .coordinator
            .create_inbound_request(NewRequest::new(item.id, 0, ""), fx.staff.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let err = fx
            .coordinator
            .create_outbound_request(NewRequest::new(ItemId::new(), 1, ""), fx.staff.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");

        let err = fx
            .coordinator
            .create_outbound_request(NewRequest::new(item.id, 6, ""), fx.staff.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApprovalError::InsufficientStock {
                available: 5,
                requested: 6
            }
        ));

        assert!(fx.store.audit_entries().is_empty());
    }

    #[tokio::test]
    async fn submission_records_pending_request_and_audit() {
        let fx = Fixture::new();
        let item = fx.item(5);

        let created = fx.outbound(&item, 2).await;

        assert_eq!(created.request.status, RequestStatus::Pending);
        assert_eq!(created.request.notes, "dock 4");
        assert!(created.approver.is_none());
        let entries = fx.entries(AuditAction::CreateOutbound);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entity_id, *created.request.id.as_uuid());
        assert_eq!(entries[0].after.as_ref().unwrap()["type"], "OUTBOUND");
        assert_eq!(fx.quantity(&item), 5);
    }

    #[tokio::test]
    async fn listing_reflects_lifecycle_filters_and_paging() {
        let fx = Fixture::new();
        let item = fx.item(500);
        let approved = fx.inbound(&item, 5).await;
        let rejected = fx.outbound(&item, 5).await;
        for _ in 0..3 {
            fx.outbound(&item, 1).await;
        }
        let supervisor = reviewer(&fx.supervisor);
        fx.coordinator
            .approve_request(approved.request.id, &supervisor)
            .await
            .unwrap();
        fx.coordinator
            .reject_request(rejected.request.id, &supervisor)
            .await
            .unwrap();

        let all = fx.coordinator.list_requests(ListRequests::default()).await.unwrap();
        assert_eq!((all.total, all.page, all.limit), (5, 1, 20));
        assert_eq!(all.data.len(), 5);
        assert!(
            all.data
                .windows(2)
                .all(|w| w[0].request.created_at >= w[1].request.created_at)
        );

        let pending_outbound = fx
            .coordinator
            .list_requests(ListRequests {
                kind: Some(RequestType::Outbound),
                status: Some(RequestStatus::Pending),
                ..ListRequests::default()
            })
            .await
            .unwrap();
        assert_eq!(pending_outbound.total, 3);

        let completed = fx
            .coordinator
            .list_requests(ListRequests {
                status: Some(RequestStatus::Completed),
                ..ListRequests::default()
            })
            .await
            .unwrap();
        assert_eq!(completed.total, 1);
        assert_eq!(completed.data[0].request.id, approved.request.id);
        assert_eq!(
            completed.data[0].approver.as_ref().map(|u| u.id),
            Some(fx.supervisor.id)
        );

        let second_page = fx
            .coordinator
            .list_requests(ListRequests {
                page: Some(2),
                limit: Some(2),
                ..ListRequests::default()
            })
            .await
            .unwrap();
        assert_eq!((second_page.total, second_page.data.len()), (5, 2));
        assert_eq!(second_page.data[0].request.id, all.data[2].request.id);

        let capped = fx
            .coordinator
            .list_requests(ListRequests {
                limit: Some(1_000),
                ..ListRequests::default()
            })
            .await
            .unwrap();
        assert_eq!(capped.limit, MAX_PAGE_LIMIT);
    }

    #[tokio::test]
    async fn get_request_resolves_relations_or_not_found() {
        let fx = Fixture::new();
        let item = fx.item(5);
        let created = fx.inbound(&item, 2).await;

        let found = fx.coordinator.get_request(created.request.id).await.unwrap();
        assert_eq!(found.request, created.request);
        assert_eq!(found.item.id, item.id);
        assert_eq!(found.creator.unwrap().email, "sam@warehouse.test");

        let err = fx.coordinator.get_request(RequestId::new()).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    /// Store whose transactions fail on the audit write once armed.
    #[derive(Clone)]
    struct FailingAudit {
        inner: InMemoryStore,
        armed: Arc<AtomicBool>,
    }

    struct FailingAuditTx {
        inner: InMemoryTransaction,
        armed: bool,
    }

    #[async_trait]
    impl Store for FailingAudit {
        type Tx = FailingAuditTx;

        async fn begin(&self) -> Result<Self::Tx, StoreError> {
            Ok(FailingAuditTx {
                inner: self.inner.begin().await?,
                armed: self.armed.load(Ordering::SeqCst),
            })
        }

        async fn find_item(&self, id: ItemId) -> Result<Option<InventoryItem>, StoreError> {
            self.inner.find_item(id).await
        }

        async fn find_request(&self, id: RequestId) -> Result<Option<RequestDetails>, StoreError> {
            self.inner.find_request(id).await
        }

        async fn list_requests(
            &self,
            filter: RequestFilter,
            offset: u64,
            limit: u32,
        ) -> Result<(Vec<RequestDetails>, u64), StoreError> {
            self.inner.list_requests(filter, offset, limit).await
        }
    }

    #[async_trait]
    impl StoreTransaction for FailingAuditTx {
        async fn locked_read_item(&mut self, id: ItemId) -> Result<Option<InventoryItem>, StoreError> {
            self.inner.locked_read_item(id).await
        }

        async fn locked_read_request(&mut self, id: RequestId) -> Result<Option<Request>, StoreError> {
            self.inner.locked_read_request(id).await
        }

        async fn write_item(&mut self, item: &InventoryItem) -> Result<(), StoreError> {
            self.inner.write_item(item).await
        }

        async fn write_request(&mut self, request: &Request) -> Result<(), StoreError> {
            self.inner.write_request(request).await
        }

        async fn write_audit_entry(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
            if self.armed {
                return Err(StoreError::Database {
                    operation: "write_audit_entry",
                    message: "audit_logs unavailable".to_string(),
                });
            }
            self.inner.write_audit_entry(entry).await
        }

        async fn commit(self) -> Result<(), StoreError> {
            self.inner.commit().await
        }

        async fn rollback(self) -> Result<(), StoreError> {
            self.inner.rollback().await
        }
    }

    #[tokio::test]
    async fn audit_failure_rolls_back_the_whole_approval() {
        let fx = Fixture::new();
        let item = fx.item(30);
        let armed = Arc::new(AtomicBool::new(false));
        let coordinator = ApprovalCoordinator::new(
            FailingAudit {
                inner: fx.store.clone(),
                armed: Arc::clone(&armed),
            },
            Arc::clone(&fx.locks),
            RolePolicy::default(),
        );
        let created = coordinator
            .create_outbound_request(NewRequest::new(item.id, 10, ""), fx.staff.id)
            .await
            .unwrap();

        armed.store(true, Ordering::SeqCst);
        let err = coordinator
            .approve_request(created.request.id, &reviewer(&fx.admin))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "internal");
        let stored = fx.store.item(item.id).unwrap();
        assert_eq!((stored.quantity, stored.version), (30, 1));
        assert_eq!(
            fx.store.request(created.request.id).unwrap().status,
            RequestStatus::Pending
        );
        assert!(fx.entries(AuditAction::OutboundApproved).is_empty());
        assert!(!fx.locks.is_held(item.id));
    }

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Inbound(i64),
        Outbound(i64),
    }

    fn step() -> impl Strategy<Value = (Step, bool)> {
        (
            prop_oneof![
                (1i64..40).prop_map(Step::Inbound),
                (1i64..40).prop_map(Step::Outbound),
            ],
            any::<bool>(),
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn stock_is_conserved_and_never_negative(
            initial in 0i64..60,
            steps in prop::collection::vec(step(), 1..12),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let fx = Fixture::new();
                let item = fx.item(initial);
                let mut expected = initial;
                let mut settled = 0usize;

                for (step, approve) in steps {
                    let submitted = match step {
                        Step::Inbound(q) => fx
                            .coordinator
                            .create_inbound_request(NewRequest::new(item.id, q, ""), fx.staff.id)
                            .await,
                        Step::Outbound(q) => fx
                            .coordinator
                            .create_outbound_request(NewRequest::new(item.id, q, ""), fx.staff.id)
                            .await,
                    };
                    let Ok(created) = submitted else {
                        continue;
                    };

                    let who = reviewer(&fx.supervisor);
                    if approve {
                        if fx.coordinator.approve_request(created.request.id, &who).await.is_ok() {
                            settled += 1;
                            expected += match step {
                                Step::Inbound(q) => q,
                                Step::Outbound(q) => -q,
                            };
                        }
                    } else {
                        fx.coordinator.reject_request(created.request.id, &who).await.unwrap();
                    }

                    assert!(fx.quantity(&item) >= 0);
                }

                let stored = fx.store.item(item.id).unwrap();
                assert_eq!(stored.quantity, expected);
                assert_eq!(stored.version, 1 + settled as i64);
            });
        }
    }
}
