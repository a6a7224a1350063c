use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fairshare_core::{Aggregate, AggregateId, DomainError, UserId};
use fairshare_events::Event;

/// Group identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub AggregateId);

impl GroupId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for GroupId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Role of a member within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Admin,
    Member,
}

/// Association between a user and a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub role: GroupRole,
    pub added_at: DateTime<Utc>,
}

/// Aggregate root: Group (shared-expense circle).
///
/// The creator is *always* effectively admin: the admin check is
/// `role == Admin || user == created_by`, regardless of what the stored
/// membership record says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    id: GroupId,
    name: String,
    description: Option<String>,
    created_by: UserId,
    members: Vec<Membership>,
    version: u64,
    created: bool,
}

impl Group {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: GroupId) -> Self {
        Self {
            id,
            name: String::new(),
            description: None,
            // Placeholder until GroupCreated is applied.
            created_by: UserId::from_uuid(uuid::Uuid::nil()),
            members: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> GroupId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn members(&self) -> &[Membership] {
        &self.members
    }

    pub fn is_member(&self, user_id: UserId) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }

    /// Creator-is-always-admin rule.
    pub fn is_admin(&self, user_id: UserId) -> bool {
        user_id == self.created_by
            || self
                .members
                .iter()
                .any(|m| m.user_id == user_id && m.role == GroupRole::Admin)
    }
}

/// Command: CreateGroup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGroup {
    pub group_id: GroupId,
    pub creator: UserId,
    pub name: String,
    pub description: Option<String>,
    /// Duplicate ids (including the creator) collapse to one membership each.
    pub initial_member_ids: Vec<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: JoinGroup (self-service).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinGroup {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: LeaveGroup (self-service).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveGroup {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddMember (admin-only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMember {
    pub group_id: GroupId,
    pub requester: UserId,
    pub member_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveMember (admin-only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveMember {
    pub group_id: GroupId,
    pub requester: UserId,
    pub member_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupCommand {
    CreateGroup(CreateGroup),
    JoinGroup(JoinGroup),
    LeaveGroup(LeaveGroup),
    AddMember(AddMember),
    RemoveMember(RemoveMember),
}

/// Event: GroupCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCreated {
    pub group_id: GroupId,
    pub creator: UserId,
    pub name: String,
    pub description: Option<String>,
    /// Full initial roster (creator first, as admin).
    pub members: Vec<Membership>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberJoined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberJoined {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberLeft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberLeft {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAdded {
    pub group_id: GroupId,
    pub member_id: UserId,
    pub added_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRemoved {
    pub group_id: GroupId,
    pub member_id: UserId,
    pub removed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupEvent {
    GroupCreated(GroupCreated),
    MemberJoined(MemberJoined),
    MemberLeft(MemberLeft),
    MemberAdded(MemberAdded),
    MemberRemoved(MemberRemoved),
}

impl Event for GroupEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GroupEvent::GroupCreated(_) => "groups.group.created",
            GroupEvent::MemberJoined(_) => "groups.group.member_joined",
            GroupEvent::MemberLeft(_) => "groups.group.member_left",
            GroupEvent::MemberAdded(_) => "groups.group.member_added",
            GroupEvent::MemberRemoved(_) => "groups.group.member_removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            GroupEvent::GroupCreated(e) => e.occurred_at,
            GroupEvent::MemberJoined(e) => e.occurred_at,
            GroupEvent::MemberLeft(e) => e.occurred_at,
            GroupEvent::MemberAdded(e) => e.occurred_at,
            GroupEvent::MemberRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Group {
    type Id = GroupId;
    type Command = GroupCommand;
    type Event = GroupEvent;
    type Error = DomainError;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            GroupEvent::GroupCreated(e) => {
                self.id = e.group_id;
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.created_by = e.creator;
                self.members = e.members.clone();
                self.created = true;
            }
            GroupEvent::MemberJoined(e) => {
                self.members.push(Membership {
                    user_id: e.user_id,
                    role: GroupRole::Member,
                    added_at: e.occurred_at,
                });
            }
            GroupEvent::MemberLeft(e) => {
                self.members.retain(|m| m.user_id != e.user_id);
            }
            GroupEvent::MemberAdded(e) => {
                self.members.push(Membership {
                    user_id: e.member_id,
                    role: GroupRole::Member,
                    added_at: e.occurred_at,
                });
            }
            GroupEvent::MemberRemoved(e) => {
                self.members.retain(|m| m.user_id != e.member_id);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            GroupCommand::CreateGroup(cmd) => self.handle_create(cmd),
            GroupCommand::JoinGroup(cmd) => self.handle_join(cmd),
            GroupCommand::LeaveGroup(cmd) => self.handle_leave(cmd),
            GroupCommand::AddMember(cmd) => self.handle_add_member(cmd),
            GroupCommand::RemoveMember(cmd) => self.handle_remove_member(cmd),
        }
    }
}

impl Group {
    fn ensure_group_id(&self, group_id: GroupId) -> Result<(), DomainError> {
        if self.id != group_id {
            return Err(DomainError::conflict("group_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::GroupNotFound);
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateGroup) -> Result<Vec<GroupEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("group already exists"));
        }

        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("group name cannot be empty"));
        }

        // Creator first, as admin; initial members collapse duplicates
        // (creator included) into a single membership each.
        let mut members = vec![Membership {
            user_id: cmd.creator,
            role: GroupRole::Admin,
            added_at: cmd.occurred_at,
        }];
        for id in &cmd.initial_member_ids {
            if members.iter().any(|m| m.user_id == *id) {
                continue;
            }
            members.push(Membership {
                user_id: *id,
                role: GroupRole::Member,
                added_at: cmd.occurred_at,
            });
        }

        Ok(vec![GroupEvent::GroupCreated(GroupCreated {
            group_id: cmd.group_id,
            creator: cmd.creator,
            name: cmd.name.clone(),
            description: cmd.description.clone(),
            members,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_join(&self, cmd: &JoinGroup) -> Result<Vec<GroupEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_group_id(cmd.group_id)?;

        if self.is_member(cmd.user_id) {
            return Err(DomainError::AlreadyMember);
        }

        Ok(vec![GroupEvent::MemberJoined(MemberJoined {
            group_id: cmd.group_id,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    // Anyone may leave, including the last admin; the group can become
    // admin-less. The creator keeps admin powers while a member either way.
    fn handle_leave(&self, cmd: &LeaveGroup) -> Result<Vec<GroupEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_group_id(cmd.group_id)?;

        if !self.is_member(cmd.user_id) {
            return Err(DomainError::NotAMember);
        }

        Ok(vec![GroupEvent::MemberLeft(MemberLeft {
            group_id: cmd.group_id,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_member(&self, cmd: &AddMember) -> Result<Vec<GroupEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_group_id(cmd.group_id)?;

        if !self.is_admin(cmd.requester) {
            return Err(DomainError::NotAuthorized);
        }
        if self.is_member(cmd.member_id) {
            return Err(DomainError::AlreadyMember);
        }

        Ok(vec![GroupEvent::MemberAdded(MemberAdded {
            group_id: cmd.group_id,
            member_id: cmd.member_id,
            added_by: cmd.requester,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_member(&self, cmd: &RemoveMember) -> Result<Vec<GroupEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_group_id(cmd.group_id)?;

        if !self.is_admin(cmd.requester) {
            return Err(DomainError::NotAuthorized);
        }
        if !self.is_member(cmd.member_id) {
            return Err(DomainError::NotAMember);
        }

        Ok(vec![GroupEvent::MemberRemoved(MemberRemoved {
            group_id: cmd.group_id,
            member_id: cmd.member_id,
            removed_by: cmd.requester,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_group_id() -> GroupId {
        GroupId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_group(creator: UserId, initial: Vec<UserId>) -> Group {
        let group_id = test_group_id();
        let mut group = Group::empty(group_id);
        let cmd = CreateGroup {
            group_id,
            creator,
            name: "Flat 4B".to_string(),
            description: None,
            initial_member_ids: initial,
            occurred_at: test_time(),
        };
        let events = group.handle(&GroupCommand::CreateGroup(cmd)).unwrap();
        group.apply(&events[0]);
        group
    }

    #[test]
    fn create_group_inserts_creator_as_admin() {
        let creator = UserId::new();
        let u2 = UserId::new();
        let group = created_group(creator, vec![u2, creator, u2]);

        // Duplicates collapse: creator + u2 only.
        assert_eq!(group.members().len(), 2);
        assert_eq!(group.members()[0].user_id, creator);
        assert_eq!(group.members()[0].role, GroupRole::Admin);
        assert!(group.is_admin(creator));
        assert!(group.is_member(u2));
        assert!(!group.is_admin(u2));
    }

    #[test]
    fn create_group_rejects_blank_name() {
        let group_id = test_group_id();
        let group = Group::empty(group_id);
        let cmd = CreateGroup {
            group_id,
            creator: UserId::new(),
            name: "   ".to_string(),
            description: None,
            initial_member_ids: vec![],
            occurred_at: test_time(),
        };

        let err = group.handle(&GroupCommand::CreateGroup(cmd)).unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for blank name"),
        }
    }

    #[test]
    fn creator_is_admin_even_with_member_role_record() {
        let creator = UserId::new();
        let mut group = created_group(creator, vec![]);

        // Simulate a roster where the creator's stored role is Member
        // (e.g. after leaving and being re-added by another admin).
        let left = GroupEvent::MemberLeft(MemberLeft {
            group_id: group.id_typed(),
            user_id: creator,
            occurred_at: test_time(),
        });
        group.apply(&left);
        let readded = GroupEvent::MemberAdded(MemberAdded {
            group_id: group.id_typed(),
            member_id: creator,
            added_by: creator,
            occurred_at: test_time(),
        });
        group.apply(&readded);

        assert_eq!(group.members()[0].role, GroupRole::Member);
        assert!(group.is_admin(creator));
    }

    #[test]
    fn join_rejects_existing_member() {
        let creator = UserId::new();
        let u2 = UserId::new();
        let group = created_group(creator, vec![u2]);

        let cmd = JoinGroup {
            group_id: group.id_typed(),
            user_id: u2,
            occurred_at: test_time(),
        };
        let err = group.handle(&GroupCommand::JoinGroup(cmd)).unwrap_err();
        assert_eq!(err, DomainError::AlreadyMember);
    }

    #[test]
    fn join_then_leave_round_trips_membership() {
        let creator = UserId::new();
        let mut group = created_group(creator, vec![]);
        let newcomer = UserId::new();

        let events = group
            .handle(&GroupCommand::JoinGroup(JoinGroup {
                group_id: group.id_typed(),
                user_id: newcomer,
                occurred_at: test_time(),
            }))
            .unwrap();
        group.apply(&events[0]);
        assert!(group.is_member(newcomer));

        let events = group
            .handle(&GroupCommand::LeaveGroup(LeaveGroup {
                group_id: group.id_typed(),
                user_id: newcomer,
                occurred_at: test_time(),
            }))
            .unwrap();
        group.apply(&events[0]);
        assert!(!group.is_member(newcomer));
    }

    #[test]
    fn leave_rejects_non_member() {
        let group = created_group(UserId::new(), vec![]);
        let outsider = UserId::new();

        let err = group
            .handle(&GroupCommand::LeaveGroup(LeaveGroup {
                group_id: group.id_typed(),
                user_id: outsider,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotAMember);
    }

    #[test]
    fn last_admin_may_leave_and_group_becomes_adminless() {
        let creator = UserId::new();
        let u2 = UserId::new();
        let mut group = created_group(creator, vec![u2]);

        let events = group
            .handle(&GroupCommand::LeaveGroup(LeaveGroup {
                group_id: group.id_typed(),
                user_id: creator,
                occurred_at: test_time(),
            }))
            .unwrap();
        group.apply(&events[0]);

        assert!(!group.is_member(creator));
        assert!(!group.is_admin(u2));
    }

    #[test]
    fn add_member_requires_admin() {
        let creator = UserId::new();
        let u2 = UserId::new();
        let group = created_group(creator, vec![u2]);
        let newcomer = UserId::new();

        let err = group
            .handle(&GroupCommand::AddMember(AddMember {
                group_id: group.id_typed(),
                requester: u2,
                member_id: newcomer,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotAuthorized);

        let events = group
            .handle(&GroupCommand::AddMember(AddMember {
                group_id: group.id_typed(),
                requester: creator,
                member_id: newcomer,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn remove_member_requires_admin_and_membership() {
        let creator = UserId::new();
        let u2 = UserId::new();
        let mut group = created_group(creator, vec![u2]);

        let err = group
            .handle(&GroupCommand::RemoveMember(RemoveMember {
                group_id: group.id_typed(),
                requester: u2,
                member_id: creator,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotAuthorized);

        let err = group
            .handle(&GroupCommand::RemoveMember(RemoveMember {
                group_id: group.id_typed(),
                requester: creator,
                member_id: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotAMember);

        let events = group
            .handle(&GroupCommand::RemoveMember(RemoveMember {
                group_id: group.id_typed(),
                requester: creator,
                member_id: u2,
                occurred_at: test_time(),
            }))
            .unwrap();
        group.apply(&events[0]);
        assert!(!group.is_member(u2));
    }

    #[test]
    fn commands_against_missing_group_fail_not_found() {
        let group = Group::empty(test_group_id());
        let err = group
            .handle(&GroupCommand::JoinGroup(JoinGroup {
                group_id: group.id_typed(),
                user_id: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::GroupNotFound);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let creator = UserId::new();
        let group = created_group(creator, vec![]);
        let before = group.clone();

        let newcomer = UserId::new();
        let _ = group
            .handle(&GroupCommand::AddMember(AddMember {
                group_id: group.id_typed(),
                requester: creator,
                member_id: newcomer,
                occurred_at: test_time(),
            }))
            .unwrap();

        assert_eq!(group, before);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: however many repeats the initial member list carries,
        /// the created roster lists the creator first as admin, contains no
        /// user twice, and contains every requested member.
        #[test]
        fn created_roster_is_deduplicated_with_creator_first(
            picks in prop::collection::vec(0usize..6, 0..12)
        ) {
            let creator = UserId::new();
            let candidates: Vec<UserId> = (0..6).map(|_| UserId::new()).collect();
            let initial: Vec<UserId> = picks.iter().map(|i| candidates[*i]).collect();

            let group = created_group(creator, initial.clone());

            prop_assert_eq!(group.members()[0].user_id, creator);
            prop_assert_eq!(group.members()[0].role, GroupRole::Admin);

            let mut seen = std::collections::HashSet::new();
            for m in group.members() {
                prop_assert!(seen.insert(m.user_id));
            }
            for id in &initial {
                prop_assert!(group.is_member(*id));
            }
        }
    }
}
