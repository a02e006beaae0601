//! FIFO match queues
//!
//! One queue exists per group kind. Every mutation happens under the queue's
//! mutex, and player status changes made here happen under it too.

use crate::error::{PickupError, Result};
use crate::player::Player;
use crate::room::Room;
use crate::types::{GroupKind, PlayerId};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Players waiting in arrival order; the front has waited longest
#[derive(Debug, Default)]
pub struct WaitingList {
    players: VecDeque<Arc<Player>>,
}

impl WaitingList {
    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn front(&self) -> Option<&Arc<Player>> {
        self.players.front()
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p.id() == player_id)
    }

    pub fn push_back(&mut self, player: Arc<Player>) {
        self.players.push_back(player);
    }

    pub fn pop_front(&mut self) -> Option<Arc<Player>> {
        self.players.pop_front()
    }

    /// Take up to `count` players from the front
    pub fn drain_front(&mut self, count: usize) -> Vec<Arc<Player>> {
        let count = count.min(self.players.len());
        self.players.drain(..count).collect()
    }

    /// Remove one player, keeping the others in order
    pub fn remove(&mut self, player_id: &str) -> Option<Arc<Player>> {
        let index = self.players.iter().position(|p| p.id() == player_id)?;
        self.players.remove(index)
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id().to_string()).collect()
    }
}

pub struct MatchQueue {
    kind: GroupKind,
    required_size: usize,
    waiting: Mutex<WaitingList>,
}

impl MatchQueue {
    pub fn new(kind: GroupKind, required_size: usize) -> Self {
        Self {
            kind,
            required_size,
            waiting: Mutex::new(WaitingList::default()),
        }
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn required_size(&self) -> usize {
        self.required_size
    }

    fn waiting(&self) -> Result<MutexGuard<'_, WaitingList>> {
        self.waiting
            .lock()
            .map_err(|_| PickupError::lock_poisoned("queue").into())
    }

    fn form_room(&self, members: Vec<Arc<Player>>) -> Room {
        let room = Room::form(self.kind, self.required_size, members);
        info!(
            "Formed {} room {} with players {:?}",
            self.kind,
            room.id(),
            room.member_ids()
        );
        room
    }

    /// Add one player to the tail
    ///
    /// Returns the formed room when this arrival fills the queue.
    pub fn enqueue(&self, player: Arc<Player>) -> Result<Option<Room>> {
        let mut waiting = self.waiting()?;
        player.begin_search(self.kind)?;
        waiting.push_back(player);

        debug!(
            "{} queue now holds {}/{} players",
            self.kind,
            waiting.len(),
            self.required_size
        );

        if waiting.len() >= self.required_size {
            let members = waiting.drain_front(self.required_size);
            return Ok(Some(self.form_room(members)));
        }
        Ok(None)
    }

    /// Add a pre-formed team, kept together and in order
    ///
    /// When the team completes a room, the longest-waiting players fill the
    /// remaining seats ahead of it; otherwise the whole team joins the tail.
    pub fn enqueue_team(&self, team: Vec<Arc<Player>>) -> Result<Option<Room>> {
        if team.is_empty() {
            return Err(PickupError::EmptyTeam.into());
        }
        let mut seen = HashSet::new();
        for player in &team {
            if !seen.insert(player.id()) {
                return Err(PickupError::DuplicateTeamMember {
                    player_id: player.id().to_string(),
                }
                .into());
            }
        }
        if team.len() > self.required_size {
            return Err(PickupError::TeamTooLarge {
                kind: self.kind,
                team_size: team.len(),
                required_size: self.required_size,
            }
            .into());
        }

        let mut waiting = self.waiting()?;

        for (index, player) in team.iter().enumerate() {
            if player.begin_search(self.kind).is_err() {
                for started in &team[..index] {
                    started.stop_searching();
                }
                return Err(PickupError::TeamMemberBusy {
                    player_id: player.id().to_string(),
                }
                .into());
            }
        }

        if waiting.len() + team.len() >= self.required_size {
            let mut members = waiting.drain_front(self.required_size - team.len());
            members.extend(team);
            return Ok(Some(self.form_room(members)));
        }

        for player in team {
            waiting.push_back(player);
        }
        debug!(
            "{} queue now holds {}/{} players",
            self.kind,
            waiting.len(),
            self.required_size
        );
        Ok(None)
    }

    /// Remove and return the longest-waiting player
    pub fn dequeue(&self) -> Result<Option<Arc<Player>>> {
        let mut waiting = self.waiting()?;
        let player = waiting.pop_front();
        if let Some(player) = &player {
            player.stop_searching();
        }
        Ok(player)
    }

    /// Remove a player from any position; false when they were not waiting here
    pub fn remove(&self, player_id: &str) -> Result<bool> {
        let mut waiting = self.waiting()?;
        match waiting.remove(player_id) {
            Some(player) => {
                player.stop_searching();
                debug!("Removed player {} from {} queue", player_id, self.kind);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Longest-waiting player, without removing it
    pub fn top(&self) -> Result<Option<Arc<Player>>> {
        Ok(self.waiting()?.front().cloned())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.waiting()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.waiting()?.is_empty())
    }

    pub fn contains(&self, player_id: &str) -> Result<bool> {
        Ok(self.waiting()?.contains(player_id))
    }

    /// Waiting player ids in order
    pub fn snapshot(&self) -> Result<Vec<PlayerId>> {
        Ok(self.waiting()?.ids())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::as_pickup_error;
    use crate::player::PlayerStatus;
    use proptest::prelude::*;

    fn player(id: &str) -> Arc<Player> {
        Arc::new(Player::new(id, "1234-5678-9012"))
    }

    fn players(count: usize) -> Vec<Arc<Player>> {
        (1..=count).map(|i| player(&i.to_string())).collect()
    }

    #[test]
    fn test_pair_formation() {
        let queue = MatchQueue::new(GroupKind::Pair, 2);
        let [a, b, c] = [player("1"), player("2"), player("3")];

        assert!(queue.enqueue(a.clone()).unwrap().is_none());
        assert_eq!(a.status(), PlayerStatus::Searching(GroupKind::Pair));

        let room = queue.enqueue(b.clone()).unwrap().unwrap();
        assert_eq!(room.member_ids(), vec!["1", "2"]);
        assert_eq!(a.status(), PlayerStatus::InMatch(room.id()));
        assert_eq!(b.status(), PlayerStatus::InMatch(room.id()));
        assert!(queue.is_empty().unwrap());

        assert!(queue.enqueue(c.clone()).unwrap().is_none());
        assert_eq!(queue.top().unwrap().unwrap().id(), "3");
    }

    #[test]
    fn test_busy_player_rejected() {
        let queue = MatchQueue::new(GroupKind::Quad, 4);
        let a = player("1");
        queue.enqueue(a.clone()).unwrap();

        let err = queue.enqueue(a.clone()).unwrap_err();
        assert!(matches!(
            as_pickup_error(&err),
            Some(PickupError::AlreadySearching { .. })
        ));
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn test_team_completes_room() {
        let queue = MatchQueue::new(GroupKind::Quad, 4);
        let all = players(4);
        queue.enqueue(all[0].clone()).unwrap();
        queue.enqueue(all[1].clone()).unwrap();

        let room = queue
            .enqueue_team(vec![all[2].clone(), all[3].clone()])
            .unwrap()
            .unwrap();
        assert_eq!(room.member_ids(), vec!["1", "2", "3", "4"]);
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_team_fill_is_exact() {
        let queue = MatchQueue::new(GroupKind::Quad, 4);
        let all = players(6);
        for p in &all[..3] {
            queue.enqueue(p.clone()).unwrap();
        }

        let room = queue
            .enqueue_team(vec![all[3].clone(), all[4].clone(), all[5].clone()])
            .unwrap()
            .unwrap();
        assert_eq!(room.player_count(), 4);
        assert_eq!(room.member_ids(), vec!["1", "4", "5", "6"]);
        assert_eq!(queue.snapshot().unwrap(), vec!["2", "3"]);
        assert!(all[1].is_searching());
    }

    #[test]
    fn test_team_waits_together() {
        let queue = MatchQueue::new(GroupKind::Private, 8);
        let all = players(3);
        queue.enqueue(all[0].clone()).unwrap();
        assert!(queue
            .enqueue_team(vec![all[1].clone(), all[2].clone()])
            .unwrap()
            .is_none());
        assert_eq!(queue.snapshot().unwrap(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_team_validation() {
        let queue = MatchQueue::new(GroupKind::Pair, 2);
        let all = players(3);

        let err = queue.enqueue_team(vec![]).unwrap_err();
        assert!(matches!(as_pickup_error(&err), Some(PickupError::EmptyTeam)));

        let err = queue.enqueue_team(all.clone()).unwrap_err();
        assert!(matches!(
            as_pickup_error(&err),
            Some(PickupError::TeamTooLarge {
                team_size: 3,
                required_size: 2,
                ..
            })
        ));

        let err = queue
            .enqueue_team(vec![all[0].clone(), all[0].clone()])
            .unwrap_err();
        assert!(matches!(
            as_pickup_error(&err),
            Some(PickupError::DuplicateTeamMember { .. })
        ));

        assert!(all.iter().all(|p| p.is_idle()));
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_busy_team_member_rolls_back() {
        let queue = MatchQueue::new(GroupKind::Quad, 4);
        let other = MatchQueue::new(GroupKind::Pair, 2);
        let all = players(3);
        other.enqueue(all[2].clone()).unwrap();

        let err = queue.enqueue_team(all.clone()).unwrap_err();
        assert!(matches!(
            as_pickup_error(&err),
            Some(PickupError::TeamMemberBusy { player_id }) if player_id == "3"
        ));
        assert!(all[0].is_idle());
        assert!(all[1].is_idle());
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_remove_and_dequeue() {
        let queue = MatchQueue::new(GroupKind::Private, 8);
        let all = players(4);
        for p in &all {
            queue.enqueue(p.clone()).unwrap();
        }

        assert!(queue.remove("2").unwrap());
        assert!(all[1].is_idle());
        assert!(!queue.remove("2").unwrap());
        assert_eq!(queue.snapshot().unwrap(), vec!["1", "3", "4"]);

        let first = queue.dequeue().unwrap().unwrap();
        assert_eq!(first.id(), "1");
        assert!(first.is_idle());
        assert_eq!(queue.len().unwrap(), 2);
    }

    proptest! {
        #[test]
        fn prop_rooms_take_arrivals_in_order(size in 2usize..8, arrivals in 0usize..40) {
            let queue = MatchQueue::new(GroupKind::Private, size);
            let all = players(arrivals);
            let mut rooms = Vec::new();
            for p in &all {
                if let Some(room) = queue.enqueue(p.clone()).unwrap() {
                    rooms.push(room);
                }
            }

            prop_assert_eq!(rooms.len(), arrivals / size);
            prop_assert_eq!(queue.len().unwrap(), arrivals % size);
            for (index, room) in rooms.iter().enumerate() {
                let expected: Vec<String> = all[index * size..(index + 1) * size]
                    .iter()
                    .map(|p| p.id().to_string())
                    .collect();
                prop_assert_eq!(room.member_ids(), expected);
            }
            for p in &all {
                prop_assert!(!(p.is_searching() && p.is_in_match()));
            }
        }

        #[test]
        fn prop_remove_is_stable(len in 1usize..20, pick in any::<prop::sample::Index>()) {
            let queue = MatchQueue::new(GroupKind::Private, 64);
            let all = players(len);
            for p in &all {
                queue.enqueue(p.clone()).unwrap();
            }

            let target = pick.index(len);
            prop_assert!(queue.remove(all[target].id()).unwrap());

            let mut expected: Vec<String> = all.iter().map(|p| p.id().to_string()).collect();
            expected.remove(target);
            prop_assert_eq!(queue.snapshot().unwrap(), expected);
        }

        #[test]
        fn prop_team_rooms_are_exact(
            size in 2usize..8,
            waiting in 0usize..8,
            team_size in 1usize..8,
        ) {
            prop_assume!(team_size <= size && waiting < size);
            let queue = MatchQueue::new(GroupKind::Private, size);
            let all = players(waiting + team_size);
            for p in &all[..waiting] {
                queue.enqueue(p.clone()).unwrap();
            }

            let team = all[waiting..].to_vec();
            match queue.enqueue_team(team).unwrap() {
                Some(room) => {
                    prop_assert_eq!(room.player_count(), size);
                    prop_assert_eq!(queue.len().unwrap(), waiting + team_size - size);
                }
                None => prop_assert_eq!(queue.len().unwrap(), waiting + team_size),
            }
        }
    }
}
