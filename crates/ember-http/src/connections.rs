use mio::{Interest, Token};
use thunderdome::{Arena, Index};

use crate::Connection;

/// Live connections, keyed by their poll token.
///
/// Tokens are derived from generational arena indices, so an event for a connection that was
/// already removed never reaches a newer connection that reused the slot.
pub struct Connections<S> {
    entries: Arena<Entry<S>>,
}

struct Entry<S> {
    connection: Connection<S>,
    /// Readiness the connection is currently registered for.
    interest: Interest,
}

impl<S> Default for Connections<S> {
    fn default() -> Self {
        Self {
            entries: Arena::new(),
        }
    }
}

impl<S> Connections<S> {
    /// Take ownership of a connection, registered for `interest`.
    pub fn insert(&mut self, connection: Connection<S>, interest: Interest) -> Token {
        let index = self.entries.insert(Entry {
            connection,
            interest,
        });

        to_token(index)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut Connection<S>> {
        let index = to_index(token)?;
        self.entries.get_mut(index).map(|entry| &mut entry.connection)
    }

    pub fn interest(&self, token: Token) -> Option<Interest> {
        let index = to_index(token)?;
        self.entries.get(index).map(|entry| entry.interest)
    }

    pub fn set_interest(&mut self, token: Token, interest: Interest) {
        if let Some(entry) = to_index(token).and_then(|index| self.entries.get_mut(index)) {
            entry.interest = interest;
        }
    }

    /// Remove a connection, handing back ownership for teardown.
    ///
    /// Returns `None` if the connection was already removed.
    pub fn remove(&mut self, token: Token) -> Option<Connection<S>> {
        let index = to_index(token)?;
        self.entries.remove(index).map(|entry| entry.connection)
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.entries.iter().map(|(index, _)| to_token(index)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }
}

fn to_token(index: Index) -> Token {
    Token(index.to_bits() as usize)
}

fn to_index(token: Token) -> Option<Index> {
    Index::from_bits(token.0 as u64)
}
