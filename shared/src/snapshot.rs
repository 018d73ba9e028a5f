//! Binary world snapshot carried inside every frame.
//!
//! Layout (little-endian): `players:u8, (id:u16, x:f32, y:f32, radius:f32)×players,
//! foods:u16, (id:u32, x:f32, y:f32, value:f32, radius:f32)×foods`.

use crate::error::{DecodeError, EncodeError};
use bytes::{Buf, BufMut};

pub const PLAYER_SIZE: usize = 2 + 4 * 3;
pub const FOOD_SIZE: usize = 4 + 4 * 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerState {
    pub id: u16,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoodState {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub value: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub players: Vec<PlayerState>,
    pub foods: Vec<FoodState>,
}

impl Snapshot {
    pub fn encoded_len(&self) -> usize {
        Self::len_for(self.players.len(), self.foods.len())
    }

    /// Encoded size of a snapshot holding `players` players and `foods` foods.
    pub fn len_for(players: usize, foods: usize) -> usize {
        1 + players * PLAYER_SIZE + 2 + foods * FOOD_SIZE
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        if self.players.len() > u8::MAX as usize {
            return Err(EncodeError::TooMany {
                what: "players",
                count: self.players.len(),
                limit: u8::MAX as usize,
            });
        }
        if self.foods.len() > u16::MAX as usize {
            return Err(EncodeError::TooMany {
                what: "foods",
                count: self.foods.len(),
                limit: u16::MAX as usize,
            });
        }

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.put_u8(self.players.len() as u8);
        for p in &self.players {
            buf.put_u16_le(p.id);
            buf.put_f32_le(p.x);
            buf.put_f32_le(p.y);
            buf.put_f32_le(p.radius);
        }
        buf.put_u16_le(self.foods.len() as u16);
        for f in &self.foods {
            buf.put_u32_le(f.id);
            buf.put_f32_le(f.x);
            buf.put_f32_le(f.y);
            buf.put_f32_le(f.value);
            buf.put_f32_le(f.radius);
        }
        Ok(buf)
    }

    /// Decodes a snapshot. Trailing bytes are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut buf = bytes;
        need(buf, 1, "snapshot player count")?;
        let player_count = buf.get_u8() as usize;
        need(buf, player_count * PLAYER_SIZE + 2, "snapshot players")?;
        let mut players = Vec::with_capacity(player_count);
        for _ in 0..player_count {
            players.push(PlayerState {
                id: buf.get_u16_le(),
                x: buf.get_f32_le(),
                y: buf.get_f32_le(),
                radius: buf.get_f32_le(),
            });
        }

        let food_count = buf.get_u16_le() as usize;
        need(buf, food_count * FOOD_SIZE, "snapshot foods")?;
        let mut foods = Vec::with_capacity(food_count);
        for _ in 0..food_count {
            foods.push(FoodState {
                id: buf.get_u32_le(),
                x: buf.get_f32_le(),
                y: buf.get_f32_le(),
                value: buf.get_f32_le(),
                radius: buf.get_f32_le(),
            });
        }

        if buf.has_remaining() {
            return Err(DecodeError::LengthMismatch {
                what: "snapshot",
                expected: bytes.len() - buf.remaining(),
                actual: bytes.len(),
            });
        }
        Ok(Snapshot { players, foods })
    }
}

fn need(buf: &[u8], needed: usize, what: &'static str) -> Result<(), DecodeError> {
    if buf.len() < needed {
        return Err(DecodeError::Truncated {
            what,
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn player(id: u16) -> PlayerState {
        PlayerState {
            id,
            x: id as f32 * 1.5,
            y: -(id as f32) * 0.25,
            radius: 1.2 + id as f32 * 0.15,
        }
    }

    fn food(id: u32) -> FoodState {
        FoodState {
            id,
            x: id as f32 - 50.0,
            y: 50.0 - id as f32,
            value: 0.15,
            radius: 0.35,
        }
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = Snapshot::default();
        let bytes = snapshot.encode().unwrap();
        assert_eq!(bytes, vec![0, 0, 0]);
        assert_eq!(Snapshot::decode(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn test_single_entries() {
        let snapshot = Snapshot {
            players: vec![player(7)],
            foods: vec![food(99)],
        };
        let bytes = snapshot.encode().unwrap();
        assert_eq!(bytes.len(), 1 + 14 + 2 + 20);
        assert_eq!(bytes.len(), snapshot.encoded_len());

        let decoded = Snapshot::decode(&bytes).unwrap();
        assert_eq!(decoded.players[0].id, 7);
        assert_approx_eq!(decoded.players[0].x, 10.5);
        assert_approx_eq!(decoded.players[0].radius, 2.25);
        assert_eq!(decoded.foods[0].id, 99);
        assert_approx_eq!(decoded.foods[0].value, 0.15);
        assert_approx_eq!(decoded.foods[0].radius, 0.35);
    }

    #[test]
    fn test_many_entries_preserve_order() {
        let snapshot = Snapshot {
            players: (1..=40).map(player).collect(),
            foods: (1..=300).map(food).collect(),
        };
        let decoded = Snapshot::decode(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_too_many_players() {
        let snapshot = Snapshot {
            players: (0..256).map(player).collect(),
            foods: vec![],
        };
        assert!(matches!(
            snapshot.encode(),
            Err(EncodeError::TooMany { what: "players", .. })
        ));
    }

    #[test]
    fn test_decode_rejects_truncation_and_trailing_bytes() {
        let bytes = Snapshot {
            players: vec![player(1)],
            foods: vec![food(1)],
        }
        .encode()
        .unwrap();
        for len in 0..bytes.len() {
            assert!(Snapshot::decode(&bytes[..len]).is_err());
        }
        let mut longer = bytes.clone();
        longer.push(1);
        assert!(matches!(
            Snapshot::decode(&longer),
            Err(DecodeError::LengthMismatch { .. })
        ));
    }
}
