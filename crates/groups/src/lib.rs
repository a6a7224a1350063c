//! `fairshare-groups`: group roster lifecycle and role enforcement.

pub mod group;

pub use group::{
    AddMember, CreateGroup, Group, GroupCommand, GroupCreated, GroupEvent, GroupId, GroupRole,
    JoinGroup, LeaveGroup, MemberAdded, MemberJoined, MemberLeft, MemberRemoved, Membership,
    RemoveMember,
};
