use rand::Rng;

/// Source of randomness for power resolution.
///
/// Handlers only ever ask for dice totals and uniform picks, so tests can script exact
/// outcomes while production draws from the thread-local generator.
pub trait Dice: Send {
    /// Roll `count` dice with `sides` faces each and return the total.
    fn roll(&mut self, count: u32, sides: u32) -> u32;
    /// Pick a uniform index in `0..bound`. Returns 0 when `bound` is 0 or 1.
    fn pick(&mut self, bound: usize) -> usize;
}

/// Production dice backed by [`rand::rng`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDice;

impl Dice for ThreadDice {
    fn roll(&mut self, count: u32, sides: u32) -> u32 {
        if sides == 0 {
            return 0;
        }
        let mut rng = rand::rng();
        (0..count).map(|_| rng.random_range(1..=sides)).sum()
    }

    fn pick(&mut self, bound: usize) -> usize {
        if bound <= 1 {
            return 0;
        }
        rand::rng().random_range(0..bound)
    }
}

/// Dice returning pre-recorded totals and picks, falling back to minimum rolls and index 0.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ScriptedDice {
    totals: std::collections::VecDeque<u32>,
    picks: std::collections::VecDeque<usize>,
}

#[cfg(test)]
impl ScriptedDice {
    pub fn new(totals: impl IntoIterator<Item = u32>, picks: impl IntoIterator<Item = usize>) -> Self {
        Self {
            totals: totals.into_iter().collect(),
            picks: picks.into_iter().collect(),
        }
    }
}

#[cfg(test)]
impl Dice for ScriptedDice {
    fn roll(&mut self, count: u32, _sides: u32) -> u32 {
        self.totals.pop_front().unwrap_or(count)
    }

    fn pick(&mut self, bound: usize) -> usize {
        let pick = self.picks.pop_front().unwrap_or(0);
        if bound == 0 { 0 } else { pick % bound }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_dice_stay_in_range() {
        let mut dice = ThreadDice;
        for _ in 0..200 {
            let total = dice.roll(2, 6);
            assert!((2..=12).contains(&total));
            assert!(dice.pick(3) < 3);
        }
        assert_eq!(dice.roll(3, 0), 0);
        assert_eq!(dice.pick(0), 0);
    }

    #[test]
    fn scripted_dice_replay_in_order() {
        let mut dice = ScriptedDice::new([7, 3], [2]);
        assert_eq!(dice.roll(2, 6), 7);
        assert_eq!(dice.roll(1, 4), 3);
        assert_eq!(dice.roll(2, 6), 2);
        assert_eq!(dice.pick(3), 2);
        assert_eq!(dice.pick(3), 0);
    }
}
