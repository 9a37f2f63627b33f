use joynet_types::user::{GroupId, Member, MemberId};

/// The group the local user has open
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupSession {
    group_id: GroupId,
    current_user: Member,
    members: Vec<Member>,
}

impl GroupSession {
    /// `members` may include the local user and duplicates. Both are dropped, first occurrence wins
    pub fn new<G: Into<GroupId>>(
        group_id: G,
        current_user: Member,
        members: impl IntoIterator<Item = Member>,
    ) -> Self {
        let mut session = Self {
            group_id: group_id.into(),
            current_user,
            members: Vec::new(),
        };

        for member in members {
            let _ = session.push_member(member);
        }

        session
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    pub fn current_user(&self) -> &Member {
        &self.current_user
    }

    /// Remote members in the order they were listed
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &MemberId> {
        self.members.iter().map(|member| &member.id)
    }

    pub fn is_self(&self, member: &MemberId) -> bool {
        &self.current_user.id == member
    }

    /// Returns false if the member is the local user or already listed
    pub(crate) fn push_member(&mut self, member: Member) -> bool {
        if self.is_self(&member.id) || self.members.iter().any(|m| m.id == member.id) {
            return false;
        }

        self.members.push(member);
        true
    }
}
