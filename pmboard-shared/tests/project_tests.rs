/// Integration tests for projects, members, features and tickets

mod common;

use pmboard_shared::auth::authorization::{authorize, AuthzError, Capability};
use pmboard_shared::error::DomainError;
use pmboard_shared::models::feature::Feature;
use pmboard_shared::models::project::{Project, ProjectStatus};
use pmboard_shared::models::project_member::{MemberRole, MemberStatus, ProjectMember};
use pmboard_shared::models::ticket::{CreateTicket, Ticket, UpdateTicket};
use sqlx::PgPool;
use uuid::Uuid;

async fn count(pool: &PgPool, sql: &str, id: Uuid) -> i64 {
    sqlx::query_scalar(sql).bind(id).fetch_one(pool).await.unwrap()
}

#[tokio::test]
async fn test_create_project_seeds_base_feature_and_owner() {
    let Some(pool) = common::test_pool().await else {
        return;
    };

    let owner = common::create_user(&pool, "Owner").await;
    let details = common::create_project(&pool, &owner).await;

    assert_eq!(details.project.owner_id, owner.id);
    assert_eq!(details.project.status, ProjectStatus::Active);
    assert_eq!(details.owner.id, owner.id);

    assert_eq!(details.features.len(), 1);
    assert!(details.features[0].is_base());

    assert_eq!(details.members.len(), 1);
    assert_eq!(details.members[0].user_id, owner.id);
    assert_eq!(details.members[0].role, MemberRole::Admin);
    assert_eq!(details.members[0].member_status, MemberStatus::Active);
}

#[tokio::test]
async fn test_delete_requires_archived_status() {
    let Some(pool) = common::test_pool().await else {
        return;
    };

    let owner = common::create_user(&pool, "Owner").await;
    let project_id = common::create_project(&pool, &owner).await.project.id;
    let base = Feature::list_by_project(&pool, project_id).await.unwrap()[0].id;
    Ticket::create(
        &pool,
        project_id,
        CreateTicket {
            feature_id: base,
            title: "Ship it".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(matches!(
        Project::delete(&pool, project_id).await,
        Err(DomainError::Conflict(_))
    ));

    Project::update_status(&pool, project_id, ProjectStatus::Archived)
        .await
        .unwrap();
    Project::delete(&pool, project_id).await.unwrap();

    assert!(Project::find_by_id(&pool, project_id).await.unwrap().is_none());
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM features WHERE project_id = $1", project_id).await,
        0
    );
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM project_members WHERE project_id = $1", project_id)
            .await,
        0
    );
}

#[tokio::test]
async fn test_feature_rules() {
    let Some(pool) = common::test_pool().await else {
        return;
    };

    let owner = common::create_user(&pool, "Owner").await;
    let details = common::create_project(&pool, &owner).await;
    let project_id = details.project.id;
    let base_id = details.features[0].id;

    assert!(matches!(
        Feature::add(&pool, project_id, " base ", None).await,
        Err(DomainError::InvalidInput(_))
    ));
    assert!(matches!(
        Feature::delete(&pool, project_id, base_id).await,
        Err(DomainError::Conflict(_))
    ));

    let feature = Feature::add(&pool, project_id, "Billing", Some("Invoices"))
        .await
        .unwrap();
    assert!(matches!(
        Feature::add(&pool, project_id, "billing", None).await,
        Err(DomainError::Conflict(_))
    ));

    let ticket = Ticket::create(
        &pool,
        project_id,
        CreateTicket {
            feature_id: feature.id,
            title: "Send invoices".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(matches!(
        Feature::delete(&pool, project_id, feature.id).await,
        Err(DomainError::Conflict(_))
    ));

    Ticket::delete(&pool, project_id, ticket.id).await.unwrap();
    Feature::delete(&pool, project_id, feature.id).await.unwrap();

    let features = Feature::list_by_project(&pool, project_id).await.unwrap();
    assert_eq!(features.len(), 1);
    assert!(features[0].is_base());
}

#[tokio::test]
async fn test_member_management() {
    let Some(pool) = common::test_pool().await else {
        return;
    };

    let owner = common::create_user(&pool, "Owner").await;
    let invitee = common::create_user(&pool, "Invitee").await;
    let details = common::create_project(&pool, &owner).await;
    let project_id = details.project.id;

    let member = ProjectMember::add(&pool, project_id, invitee.id, MemberRole::Member)
        .await
        .unwrap();
    assert_eq!(member.member_status, MemberStatus::Pending);

    assert!(matches!(
        ProjectMember::add(&pool, project_id, invitee.id, MemberRole::Admin).await,
        Err(DomainError::Conflict(_))
    ));
    assert!(matches!(
        ProjectMember::add(&pool, project_id, Uuid::new_v4(), MemberRole::Member).await,
        Err(DomainError::NotFound(_))
    ));

    let promoted = ProjectMember::update_role(&pool, project_id, member.id, MemberRole::Admin)
        .await
        .unwrap();
    assert_eq!(promoted.role, MemberRole::Admin);

    let owner_member_id = details.members[0].id;
    assert!(matches!(
        ProjectMember::remove(&pool, project_id, owner_member_id).await,
        Err(DomainError::Conflict(_))
    ));

    ProjectMember::remove(&pool, project_id, member.id).await.unwrap();
    assert!(ProjectMember::find(&pool, project_id, invitee.id)
        .await
        .unwrap()
        .is_none());

    let joined = Project::list_joined(&pool, invitee.id).await.unwrap();
    assert!(joined.iter().all(|p| p.project_id != project_id));
}

#[tokio::test]
async fn test_owner_row_stays_active_admin() {
    let Some(pool) = common::test_pool().await else {
        return;
    };

    let owner = common::create_user(&pool, "Owner").await;
    let details = common::create_project(&pool, &owner).await;
    let project_id = details.project.id;
    let owner_member_id = details.members[0].id;

    assert!(matches!(
        ProjectMember::update_status(&pool, project_id, owner_member_id, MemberStatus::Inactive)
            .await,
        Err(DomainError::Conflict(_))
    ));
    assert!(matches!(
        ProjectMember::update_role(&pool, project_id, owner_member_id, MemberRole::Member).await,
        Err(DomainError::Conflict(_))
    ));

    // Re-asserting the owner's current values is allowed
    ProjectMember::update_role(&pool, project_id, owner_member_id, MemberRole::Admin)
        .await
        .unwrap();
    ProjectMember::update_status(&pool, project_id, owner_member_id, MemberStatus::Active)
        .await
        .unwrap();

    let row = ProjectMember::find(&pool, project_id, owner.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.role, MemberRole::Admin);
    assert_eq!(row.member_status, MemberStatus::Active);

    let ticket = Ticket::create(
        &pool,
        project_id,
        CreateTicket {
            feature_id: details.features[0].id,
            title: "Owner task".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let assigned = Ticket::add_assignee(&pool, project_id, ticket.id, owner.id)
        .await
        .unwrap();
    assert_eq!(assigned.assignees[0].user_id, owner.id);

    assert!(matches!(
        ProjectMember::update_role(&pool, project_id, Uuid::new_v4(), MemberRole::Admin).await,
        Err(DomainError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_ticket_is_scoped_to_its_project() {
    let Some(pool) = common::test_pool().await else {
        return;
    };

    let owner = common::create_user(&pool, "Owner").await;
    let first = common::create_project(&pool, &owner).await;
    let second = common::create_project(&pool, &owner).await;

    // A feature of another project is not found
    let result = Ticket::create(
        &pool,
        first.project.id,
        CreateTicket {
            feature_id: second.features[0].id,
            title: "Misplaced".to_string(),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(result, Err(DomainError::NotFound(_))));

    let ticket = Ticket::create(
        &pool,
        first.project.id,
        CreateTicket {
            feature_id: first.features[0].id,
            title: "  Write docs  ".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(ticket.title, "Write docs");
    assert_eq!(ticket.time_log, 0);

    assert!(Ticket::find_in_project(&pool, second.project.id, ticket.id)
        .await
        .unwrap()
        .is_none());
    assert!(matches!(
        Ticket::delete(&pool, second.project.id, ticket.id).await,
        Err(DomainError::NotFound(_))
    ));

    let updated = Ticket::update(
        &pool,
        first.project.id,
        ticket.id,
        UpdateTicket {
            description: Some("Getting started guide".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.title, "Write docs");
    assert_eq!(updated.description, "Getting started guide");
}

#[tokio::test]
async fn test_time_log() {
    let Some(pool) = common::test_pool().await else {
        return;
    };

    let owner = common::create_user(&pool, "Owner").await;
    let details = common::create_project(&pool, &owner).await;
    let project_id = details.project.id;
    let ticket = Ticket::create(
        &pool,
        project_id,
        CreateTicket {
            feature_id: details.features[0].id,
            title: "Estimate".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let logged = Ticket::set_time_log(&pool, project_id, ticket.id, 90).await.unwrap();
    assert_eq!(logged.time_log, 90);

    assert!(matches!(
        Ticket::set_time_log(&pool, project_id, ticket.id, -1).await,
        Err(DomainError::InvalidInput(_))
    ));

    let cleared = Ticket::clear_time_log(&pool, project_id, ticket.id).await.unwrap();
    assert_eq!(cleared.time_log, 0);
}

#[tokio::test]
async fn test_assignment_requires_active_member() {
    let Some(pool) = common::test_pool().await else {
        return;
    };

    let owner = common::create_user(&pool, "Owner").await;
    let dev = common::create_user(&pool, "Dev").await;
    let outsider = common::create_user(&pool, "Outsider").await;
    let details = common::create_project(&pool, &owner).await;
    let project_id = details.project.id;

    let ticket = Ticket::create(
        &pool,
        project_id,
        CreateTicket {
            feature_id: details.features[0].id,
            title: "Fix login".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(matches!(
        Ticket::add_assignee(&pool, project_id, ticket.id, outsider.id).await,
        Err(DomainError::UserNotAMember(_))
    ));

    let member = ProjectMember::add(&pool, project_id, dev.id, MemberRole::Member)
        .await
        .unwrap();
    assert!(matches!(
        Ticket::add_assignee(&pool, project_id, ticket.id, dev.id).await,
        Err(DomainError::UserNotAMember(_))
    ));

    ProjectMember::update_status(&pool, project_id, member.id, MemberStatus::Active)
        .await
        .unwrap();
    let assigned = Ticket::add_assignee(&pool, project_id, ticket.id, dev.id)
        .await
        .unwrap();
    assert_eq!(assigned.assignees.len(), 1);
    assert_eq!(assigned.assignees[0].user_id, dev.id);

    assert!(matches!(
        Ticket::add_assignee(&pool, project_id, ticket.id, dev.id).await,
        Err(DomainError::AlreadyAssigned)
    ));

    // An inactive member can still be unassigned
    ProjectMember::update_status(&pool, project_id, member.id, MemberStatus::Inactive)
        .await
        .unwrap();
    assert!(Ticket::remove_assignee(&pool, project_id, ticket.id, dev.id)
        .await
        .unwrap());
    assert!(!Ticket::remove_assignee(&pool, project_id, ticket.id, dev.id)
        .await
        .unwrap());

    assert!(matches!(
        Ticket::remove_assignee(&pool, project_id, ticket.id, outsider.id).await,
        Err(DomainError::UserNotAMember(_))
    ));

    let reloaded = Ticket::with_assignees(&pool, project_id, ticket.id).await.unwrap();
    assert!(reloaded.assignees.is_empty());
}

#[tokio::test]
async fn test_assignment_waits_for_concurrent_status_change() {
    let Some(pool) = common::test_pool().await else {
        return;
    };

    let owner = common::create_user(&pool, "Owner").await;
    let dev = common::create_user(&pool, "Dev").await;
    let details = common::create_project(&pool, &owner).await;
    let project_id = details.project.id;

    let member = ProjectMember::add(&pool, project_id, dev.id, MemberRole::Member)
        .await
        .unwrap();
    ProjectMember::update_status(&pool, project_id, member.id, MemberStatus::Active)
        .await
        .unwrap();

    let ticket = Ticket::create(
        &pool,
        project_id,
        CreateTicket {
            feature_id: details.features[0].id,
            title: "Race".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    // Deactivate the member in a transaction that holds the row lock while
    // the assignment is attempted
    let mut tx = pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM project_members WHERE id = $1 FOR UPDATE")
        .bind(member.id)
        .execute(&mut *tx)
        .await
        .unwrap();

    let assign = tokio::spawn({
        let pool = pool.clone();
        async move { Ticket::add_assignee(&pool, project_id, ticket.id, dev.id).await }
    });

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(!assign.is_finished());

    sqlx::query("UPDATE project_members SET member_status = 'INACTIVE' WHERE id = $1")
        .bind(member.id)
        .execute(&mut *tx)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert!(matches!(
        assign.await.unwrap(),
        Err(DomainError::UserNotAMember(_))
    ));

    let reloaded = Ticket::with_assignees(&pool, project_id, ticket.id).await.unwrap();
    assert!(reloaded.assignees.is_empty());
}

#[tokio::test]
async fn test_authorization_guard() {
    let Some(pool) = common::test_pool().await else {
        return;
    };

    let owner = common::create_user(&pool, "Owner").await;
    let admin = common::create_user(&pool, "Admin").await;
    let member = common::create_user(&pool, "Member").await;
    let outsider = common::create_user(&pool, "Outsider").await;
    let project_id = common::create_project(&pool, &owner).await.project.id;

    let admin_row = ProjectMember::add(&pool, project_id, admin.id, MemberRole::Admin)
        .await
        .unwrap();
    let member_row = ProjectMember::add(&pool, project_id, member.id, MemberRole::Member)
        .await
        .unwrap();

    // Pending members get nothing
    assert!(matches!(
        authorize(&pool, Some(admin.id), project_id, Capability::MemberOrOwner).await,
        Err(AuthzError::Forbidden)
    ));

    ProjectMember::update_status(&pool, project_id, admin_row.id, MemberStatus::Active)
        .await
        .unwrap();
    ProjectMember::update_status(&pool, project_id, member_row.id, MemberStatus::Active)
        .await
        .unwrap();

    for cap in [Capability::Owner, Capability::AdminOrOwner, Capability::MemberOrOwner] {
        assert!(authorize(&pool, Some(owner.id), project_id, cap).await.is_ok());
    }

    assert!(authorize(&pool, Some(admin.id), project_id, Capability::AdminOrOwner)
        .await
        .is_ok());
    assert!(matches!(
        authorize(&pool, Some(admin.id), project_id, Capability::Owner).await,
        Err(AuthzError::Forbidden)
    ));

    assert!(authorize(&pool, Some(member.id), project_id, Capability::MemberOrOwner)
        .await
        .is_ok());
    assert!(matches!(
        authorize(&pool, Some(member.id), project_id, Capability::AdminOrOwner).await,
        Err(AuthzError::Forbidden)
    ));

    assert!(matches!(
        authorize(&pool, Some(outsider.id), project_id, Capability::MemberOrOwner).await,
        Err(AuthzError::Forbidden)
    ));
    assert!(matches!(
        authorize(&pool, None, project_id, Capability::MemberOrOwner).await,
        Err(AuthzError::Unauthenticated)
    ));
    assert!(matches!(
        authorize(&pool, Some(owner.id), Uuid::new_v4(), Capability::Owner).await,
        Err(AuthzError::ProjectNotFound)
    ));

    // Deactivation revokes access
    ProjectMember::update_status(&pool, project_id, member_row.id, MemberStatus::Inactive)
        .await
        .unwrap();
    assert!(matches!(
        authorize(&pool, Some(member.id), project_id, Capability::MemberOrOwner).await,
        Err(AuthzError::Forbidden)
    ));
}
