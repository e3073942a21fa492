use serde::{Deserialize, Serialize};
use taglog_core::{
    AppendCondition, Event, EventData, EventId, EventStore, EventType, ExpectedHighestSequenceNumber,
    Query, ReadOptions, SequencePosition, Tag, Tags, ValidationError,
};

/// Stable identifier for a simulated agent.
pub type AgentId = usize;

/// Event type appended by deciding agents.
pub const CLAIM_EVENT_TYPE: &str = "ResourceClaimed";

/// Tag key scoping each resource's consistency boundary.
pub const RESOURCE_TAG_KEY: &str = "resource";

/// Tag key recording which agent made a claim.
pub const AGENT_TAG_KEY: &str = "agent";

/// Tag identifying `resource`.
///
/// # Errors
///
/// Never fails for numeric ids; the error is propagated from tag validation.
pub fn resource_tag(resource: usize) -> Result<Tag, ValidationError> {
    Tag::new(RESOURCE_TAG_KEY, &resource.to_string())
}

/// Query selecting every event of `resource`.
///
/// # Errors
///
/// Propagates tag validation errors.
pub fn resource_query(resource: usize) -> Result<Query, ValidationError> {
    Query::for_tags(Tags::single(resource_tag(resource)?))
}

/// What an agent saw the last time it read a resource's slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub resource: usize,
    pub round: u64,
    pub highest: Option<SequencePosition>,
}

impl Observation {
    /// Expectation to guard a decision based on this observation.
    #[must_use]
    pub const fn expected(&self) -> ExpectedHighestSequenceNumber {
        ExpectedHighestSequenceNumber::from_position(self.highest)
    }
}

/// Immutable snapshot of an agent's local state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: AgentId,
    pub observations: u64,
    pub commits: u64,
    pub rejections: u64,
    pub last_observation: Option<Observation>,
}

/// Agent that reads a resource's slice, then claims it under a condition
/// built from what it read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedAgent {
    id: AgentId,
    next_seq: u64,
    observations: u64,
    commits: u64,
    rejections: u64,
    last_observation: Option<Observation>,
}

impl SimulatedAgent {
    #[must_use]
    pub const fn new(id: AgentId) -> Self {
        Self {
            id,
            next_seq: 0,
            observations: 0,
            commits: 0,
            rejections: 0,
            last_observation: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> AgentId {
        self.id
    }

    #[must_use]
    pub const fn last_observation(&self) -> Option<Observation> {
        self.last_observation
    }

    /// Read the slice of `resource` and remember its highest position.
    ///
    /// # Errors
    ///
    /// Propagates tag validation errors.
    pub fn observe<S: EventStore>(
        &mut self,
        store: &S,
        resource: usize,
        round: u64,
    ) -> Result<Observation, ValidationError> {
        let query = resource_query(resource)?;
        let highest = store
            .read(&query, ReadOptions::backwards().with_limit(1))
            .next()
            .map(|event| event.position);
        let observation = Observation {
            resource,
            round,
            highest,
        };
        self.observations += 1;
        self.last_observation = Some(observation);
        Ok(observation)
    }

    /// Build the next claim event for `resource`.
    ///
    /// # Errors
    ///
    /// Propagates id, type and tag validation errors.
    pub fn claim(&mut self, resource: usize, round: u64) -> Result<Event, ValidationError> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let tags: Tags = [
            resource_tag(resource)?,
            Tag::new(AGENT_TAG_KEY, &self.id.to_string())?,
        ]
        .into_iter()
        .collect();
        Ok(Event::new(
            EventId::new(format!("a{}-{seq}", self.id))?,
            EventType::new(CLAIM_EVENT_TYPE)?,
            EventData::new(format!(
                r#"{{"agent":{},"resource":{resource},"round":{round}}}"#,
                self.id
            )),
        )
        .with_tags(tags))
    }

    /// Condition guarding a claim on the last observed resource.
    ///
    /// # Errors
    ///
    /// Propagates tag validation errors.
    pub fn condition_from(observation: &Observation) -> Result<AppendCondition, ValidationError> {
        Ok(AppendCondition::new(
            resource_query(observation.resource)?,
            observation.expected(),
        ))
    }

    pub fn record_commit(&mut self) {
        self.commits += 1;
    }

    pub fn record_rejection(&mut self) {
        self.rejections += 1;
    }

    #[must_use]
    pub const fn snapshot(&self) -> AgentState {
        AgentState {
            id: self.id,
            observations: self.observations,
            commits: self.commits,
            rejections: self.rejections,
            last_observation: self.last_observation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taglog_core::{FixedClock, InMemoryEventStore};

    fn store() -> InMemoryEventStore<FixedClock> {
        InMemoryEventStore::with_clock(FixedClock::new(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH))
    }

    #[test]
    fn observe_empty_slice_expects_none() {
        let store = store();
        let mut agent = SimulatedAgent::new(0);
        let obs = agent.observe(&store, 3, 1).expect("observe");
        assert_eq!(obs.highest, None);
        assert_eq!(obs.expected(), ExpectedHighestSequenceNumber::None);
        assert_eq!(agent.snapshot().observations, 1);
    }

    #[test]
    fn claim_is_tagged_with_resource_and_agent() {
        let mut agent = SimulatedAgent::new(4);
        let event = agent.claim(2, 0).expect("claim");
        assert_eq!(event.event_type.as_str(), CLAIM_EVENT_TYPE);
        assert_eq!(event.tags.to_strings(), vec!["agent:4", "resource:2"]);
        let second = agent.claim(2, 0).expect("claim");
        assert_ne!(event.id, second.id);
    }

    #[test]
    fn stale_observation_is_rejected() {
        let mut store = store();
        let mut a = SimulatedAgent::new(0);
        let mut b = SimulatedAgent::new(1);
        let seen_a = a.observe(&store, 0, 0).expect("observe");
        let seen_b = b.observe(&store, 0, 0).expect("observe");

        let claim = a.claim(0, 0).expect("claim");
        let cond = SimulatedAgent::condition_from(&seen_a).expect("cond");
        assert!(store.append(claim.into(), Some(cond)).is_ok());

        let claim = b.claim(0, 0).expect("claim");
        let cond = SimulatedAgent::condition_from(&seen_b).expect("cond");
        assert!(store.append(claim.into(), Some(cond)).is_err());
    }

    #[test]
    fn claims_on_other_resources_do_not_interfere() {
        let mut store = store();
        let mut a = SimulatedAgent::new(0);
        let seen = a.observe(&store, 0, 0).expect("observe");
        store
            .append(a.claim(1, 0).expect("claim").into(), None)
            .expect("append");
        let cond = SimulatedAgent::condition_from(&seen).expect("cond");
        assert!(store.append(a.claim(0, 1).expect("claim").into(), Some(cond)).is_ok());
    }
}
