// Relationship state machine - pure functions over the four stored lists
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::db::models::UnknownVariant;

/// One of the four per-identity relationship lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationList {
    Friends,
    Following,
    Followers,
    /// Incoming friend requests
    Requests,
}

impl RelationList {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Friends => "friends",
            Self::Following => "following",
            Self::Followers => "followers",
            Self::Requests => "requests",
        }
    }
}

impl FromStr for RelationList {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "friends" => Ok(Self::Friends),
            "following" => Ok(Self::Following),
            "followers" => Ok(Self::Followers),
            "requests" => Ok(Self::Requests),
            other => Err(UnknownVariant {
                kind: "relation list",
                value: other.to_string(),
            }),
        }
    }
}

/// The stored relationship lists of a single identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relations {
    pub id: String,
    pub friends: Vec<String>,
    pub following: Vec<String>,
    pub followers: Vec<String>,
    pub requests: Vec<String>,
}

impl Relations {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn list(&self, list: RelationList) -> &[String] {
        match list {
            RelationList::Friends => &self.friends,
            RelationList::Following => &self.following,
            RelationList::Followers => &self.followers,
            RelationList::Requests => &self.requests,
        }
    }

    fn list_mut(&mut self, list: RelationList) -> &mut Vec<String> {
        match list {
            RelationList::Friends => &mut self.friends,
            RelationList::Following => &mut self.following,
            RelationList::Followers => &mut self.followers,
            RelationList::Requests => &mut self.requests,
        }
    }

    pub fn contains(&self, list: RelationList, member: &str) -> bool {
        self.list(list).iter().any(|m| m == member)
    }

    /// Apply a change addressed to this identity. Lists have set semantics.
    pub fn apply(&mut self, change: &Change) {
        if change.owner != self.id {
            return;
        }
        let members = self.list_mut(change.list);
        match change.action {
            ChangeAction::Add => {
                if !members.iter().any(|m| *m == change.member) {
                    members.push(change.member.clone());
                }
            }
            ChangeAction::Remove => members.retain(|m| *m != change.member),
        }
    }
}

/// `Friends(a, b)`: each is in the other's friends list.
pub fn are_friends(a: &Relations, b: &Relations) -> bool {
    b.contains(RelationList::Friends, &a.id) && a.contains(RelationList::Friends, &b.id)
}

/// `Following(a, b)`: a follows b.
pub fn is_following(a: &Relations, b: &Relations) -> bool {
    a.contains(RelationList::Following, &b.id)
}

/// `RequestPending(a, b)`: a sent a friend request that b has not answered.
pub fn request_pending(a: &Relations, b: &Relations) -> bool {
    b.contains(RelationList::Requests, &a.id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Add,
    Remove,
}

/// A single list mutation on one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub owner: String,
    pub list: RelationList,
    pub member: String,
    pub action: ChangeAction,
}

impl Change {
    fn add(owner: &Relations, list: RelationList, member: &Relations) -> Self {
        Self {
            owner: owner.id.clone(),
            list,
            member: member.id.clone(),
            action: ChangeAction::Add,
        }
    }

    fn remove(owner: &Relations, list: RelationList, member: &Relations) -> Self {
        Self {
            owner: owner.id.clone(),
            list,
            member: member.id.clone(),
            action: ChangeAction::Remove,
        }
    }
}

/// Social-graph operations. The actor is always the authenticated caller and
/// the target is the other identity in the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationOp {
    /// Actor asks target to be friends
    SendRequest,
    /// Actor withdraws a request it sent to target
    CancelRequest,
    /// Actor accepts the request target sent
    AcceptRequest,
    /// Actor declines the request target sent
    DeleteRequest,
    Follow,
    Unfollow,
    Unfriend,
}

impl RelationOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendRequest => "send_request",
            Self::CancelRequest => "cancel_request",
            Self::AcceptRequest => "accept_request",
            Self::DeleteRequest => "delete_request",
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
            Self::Unfriend => "unfriend",
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            Self::SendRequest => "Friend request has been sent",
            Self::CancelRequest => "You successfully canceled the request",
            Self::AcceptRequest => "Friend request has been accepted",
            Self::DeleteRequest => "Friend request has been deleted",
            Self::Follow => "You are now following this user",
            Self::Unfollow => "You have unfollowed this user",
            Self::Unfriend => "Unfriending was successful",
        }
    }
}

impl fmt::Display for RelationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RelationError {
    #[error("You can't perform this action on yourself")]
    SelfReference,
    #[error("Friend request already sent")]
    AlreadyRequested,
    #[error("There is no friend request to cancel")]
    NothingToCancel,
    #[error("You are already friends or there is no request to accept")]
    AlreadyFriends,
    #[error("There is no friend request to delete")]
    NoSuchRequest,
    #[error("You are already following this user")]
    AlreadyFollowing,
    #[error("You are not following this user")]
    NotFollowing,
}

/// Decide the list changes for `op`, or why it is rejected. Never mutates.
///
/// An empty plan is a successful no-op (unfriending someone who is not a
/// friend).
pub fn plan(
    op: RelationOp,
    actor: &Relations,
    target: &Relations,
) -> Result<Vec<Change>, RelationError> {
    use RelationList::*;

    if actor.id == target.id {
        return Err(RelationError::SelfReference);
    }

    let (a, b) = (actor, target);
    match op {
        RelationOp::SendRequest => {
            if request_pending(a, b) || are_friends(a, b) {
                return Err(RelationError::AlreadyRequested);
            }
            Ok(vec![
                Change::add(b, Requests, a),
                Change::add(b, Followers, a),
                Change::add(a, Following, b),
            ])
        }
        RelationOp::CancelRequest => {
            if !request_pending(a, b) || are_friends(a, b) {
                return Err(RelationError::NothingToCancel);
            }
            Ok(vec![
                Change::remove(b, Requests, a),
                Change::remove(b, Followers, a),
                Change::remove(a, Following, b),
            ])
        }
        RelationOp::AcceptRequest => {
            // The target is the sender here.
            let (sender, receiver) = (b, a);
            if !request_pending(sender, receiver) {
                return Err(RelationError::AlreadyFriends);
            }
            Ok(vec![
                Change::add(receiver, Friends, sender),
                Change::add(receiver, Following, sender),
                Change::add(sender, Friends, receiver),
                Change::add(sender, Followers, receiver),
                Change::remove(receiver, Requests, sender),
            ])
        }
        RelationOp::DeleteRequest => {
            let (sender, receiver) = (b, a);
            if !request_pending(sender, receiver) {
                return Err(RelationError::NoSuchRequest);
            }
            Ok(vec![
                Change::remove(receiver, Requests, sender),
                Change::remove(receiver, Followers, sender),
                Change::remove(sender, Following, receiver),
            ])
        }
        RelationOp::Follow => {
            if is_following(a, b) || b.contains(Followers, &a.id) {
                return Err(RelationError::AlreadyFollowing);
            }
            Ok(vec![Change::add(b, Followers, a), Change::add(a, Following, b)])
        }
        RelationOp::Unfollow => {
            if !is_following(a, b) {
                return Err(RelationError::NotFollowing);
            }
            Ok(vec![
                Change::remove(b, Followers, a),
                Change::remove(a, Following, b),
            ])
        }
        RelationOp::Unfriend => {
            if !are_friends(a, b) {
                return Ok(Vec::new());
            }
            let mut changes = Vec::with_capacity(6);
            for list in [Friends, Following, Followers] {
                changes.push(Change::remove(b, list, a));
                changes.push(Change::remove(a, list, b));
            }
            Ok(changes)
        }
    }
}

/// How the viewer stands with a profile they are looking at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Friendship {
    pub friends: bool,
    pub following: bool,
    pub request_sent: bool,
    pub request_received: bool,
}

pub fn friendship(viewer: &Relations, profile: &Relations) -> Friendship {
    Friendship {
        friends: are_friends(viewer, profile),
        following: is_following(viewer, profile),
        request_sent: request_pending(viewer, profile),
        request_received: request_pending(profile, viewer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (Relations, Relations) {
        (Relations::new("alice"), Relations::new("bob"))
    }

    /// Run `op` and apply the resulting plan to both sides.
    fn run(
        op: RelationOp,
        actor: &mut Relations,
        target: &mut Relations,
    ) -> Result<usize, RelationError> {
        let changes = plan(op, actor, target)?;
        for change in &changes {
            actor.apply(change);
            target.apply(change);
        }
        Ok(changes.len())
    }

    #[test]
    fn send_then_cancel_round_trips() {
        let (mut a, mut b) = pair();

        run(RelationOp::SendRequest, &mut a, &mut b).unwrap();
        assert!(request_pending(&a, &b));
        assert!(is_following(&a, &b));
        assert!(b.contains(RelationList::Followers, "alice"));

        run(RelationOp::CancelRequest, &mut a, &mut b).unwrap();
        assert!(!request_pending(&a, &b));
        assert!(!is_following(&a, &b));
        assert_eq!(a, Relations::new("alice"));
        assert_eq!(b, Relations::new("bob"));
    }

    #[test]
    fn duplicate_request_is_rejected_without_changes() {
        let (mut a, mut b) = pair();
        run(RelationOp::SendRequest, &mut a, &mut b).unwrap();
        let (a_before, b_before) = (a.clone(), b.clone());

        let result = run(RelationOp::SendRequest, &mut a, &mut b);
        assert_eq!(result, Err(RelationError::AlreadyRequested));
        assert_eq!(a, a_before);
        assert_eq!(b, b_before);
    }

    #[test]
    fn accept_makes_mutual_friends_and_followers() {
        let (mut a, mut b) = pair();
        run(RelationOp::SendRequest, &mut a, &mut b).unwrap();

        // Bob accepts Alice's request.
        run(RelationOp::AcceptRequest, &mut b, &mut a).unwrap();

        assert!(are_friends(&a, &b));
        assert!(!request_pending(&a, &b));
        assert!(is_following(&a, &b));
        assert!(is_following(&b, &a));
        assert!(a.contains(RelationList::Followers, "bob"));
        assert!(b.contains(RelationList::Followers, "alice"));
    }

    #[test]
    fn accept_without_request_is_rejected() {
        let (mut a, mut b) = pair();
        assert_eq!(
            run(RelationOp::AcceptRequest, &mut b, &mut a),
            Err(RelationError::AlreadyFriends)
        );
    }

    #[test]
    fn request_to_a_friend_is_rejected() {
        let (mut a, mut b) = pair();
        run(RelationOp::SendRequest, &mut a, &mut b).unwrap();
        run(RelationOp::AcceptRequest, &mut b, &mut a).unwrap();

        assert_eq!(
            run(RelationOp::SendRequest, &mut a, &mut b),
            Err(RelationError::AlreadyRequested)
        );
        assert_eq!(
            run(RelationOp::SendRequest, &mut b, &mut a),
            Err(RelationError::AlreadyRequested)
        );
    }

    #[test]
    fn unfriend_severs_every_list() {
        let (mut a, mut b) = pair();
        run(RelationOp::SendRequest, &mut a, &mut b).unwrap();
        run(RelationOp::AcceptRequest, &mut b, &mut a).unwrap();

        run(RelationOp::Unfriend, &mut a, &mut b).unwrap();

        assert!(!are_friends(&a, &b));
        assert!(!is_following(&a, &b));
        assert!(!is_following(&b, &a));
        assert!(a.followers.is_empty() && b.followers.is_empty());
    }

    #[test]
    fn unfriend_when_not_friends_is_a_no_op() {
        let (mut a, mut b) = pair();
        run(RelationOp::Follow, &mut a, &mut b).unwrap();
        let (a_before, b_before) = (a.clone(), b.clone());

        assert_eq!(run(RelationOp::Unfriend, &mut a, &mut b), Ok(0));
        assert_eq!(a, a_before);
        assert_eq!(b, b_before);
    }

    #[test]
    fn decline_clears_request_and_follow() {
        let (mut a, mut b) = pair();
        run(RelationOp::SendRequest, &mut a, &mut b).unwrap();

        run(RelationOp::DeleteRequest, &mut b, &mut a).unwrap();
        assert!(!request_pending(&a, &b));
        assert!(!is_following(&a, &b));
        assert!(b.followers.is_empty());

        assert_eq!(
            run(RelationOp::DeleteRequest, &mut b, &mut a),
            Err(RelationError::NoSuchRequest)
        );
    }

    #[test]
    fn cancel_without_request_is_rejected() {
        let (mut a, mut b) = pair();
        assert_eq!(
            run(RelationOp::CancelRequest, &mut a, &mut b),
            Err(RelationError::NothingToCancel)
        );
    }

    #[test]
    fn follow_and_unfollow_touch_only_follow_lists() {
        let (mut a, mut b) = pair();
        run(RelationOp::Follow, &mut a, &mut b).unwrap();
        assert!(is_following(&a, &b));
        assert!(!request_pending(&a, &b));
        assert_eq!(
            run(RelationOp::Follow, &mut a, &mut b),
            Err(RelationError::AlreadyFollowing)
        );

        run(RelationOp::Unfollow, &mut a, &mut b).unwrap();
        assert!(!is_following(&a, &b));
        assert_eq!(
            run(RelationOp::Unfollow, &mut a, &mut b),
            Err(RelationError::NotFollowing)
        );
    }

    #[test]
    fn follow_is_rejected_when_already_listed_as_follower() {
        let (a, mut b) = pair();
        b.followers.push("alice".into());
        assert_eq!(
            plan(RelationOp::Follow, &a, &b),
            Err(RelationError::AlreadyFollowing)
        );
    }

    #[test]
    fn self_targeting_is_always_rejected() {
        let me = Relations::new("alice");
        for op in [
            RelationOp::SendRequest,
            RelationOp::CancelRequest,
            RelationOp::AcceptRequest,
            RelationOp::DeleteRequest,
            RelationOp::Follow,
            RelationOp::Unfollow,
            RelationOp::Unfriend,
        ] {
            assert_eq!(
                plan(op, &me, &me),
                Err(RelationError::SelfReference),
                "{op}"
            );
        }
    }

    #[test]
    fn apply_ignores_changes_for_other_owners() {
        let mut a = Relations::new("alice");
        a.apply(&Change {
            owner: "bob".into(),
            list: RelationList::Friends,
            member: "carol".into(),
            action: ChangeAction::Add,
        });
        assert!(a.friends.is_empty());
    }

    #[test]
    fn friendship_reports_both_request_directions() {
        let (mut a, mut b) = pair();
        run(RelationOp::SendRequest, &mut a, &mut b).unwrap();

        let seen_by_a = friendship(&a, &b);
        assert!(seen_by_a.request_sent);
        assert!(seen_by_a.following);
        assert!(!seen_by_a.request_received);

        let seen_by_b = friendship(&b, &a);
        assert!(seen_by_b.request_received);
        assert!(!seen_by_b.following);
        assert!(!seen_by_b.friends);
    }

    #[test]
    fn relation_list_parses_stored_names() {
        for list in [
            RelationList::Friends,
            RelationList::Following,
            RelationList::Followers,
            RelationList::Requests,
        ] {
            assert_eq!(list.as_str().parse::<RelationList>().unwrap(), list);
        }
        assert!("blocked".parse::<RelationList>().is_err());
    }
}
