use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Open time, milliseconds since the epoch
    pub timestamp: i64,
}

impl Candle {
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Candle {
            open,
            high,
            low,
            close,
            volume,
            timestamp: 0,
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// High-low span
    pub fn range(&self) -> f64 {
        (self.high - self.low).abs()
    }

    /// Wilder's true range against the previous close
    pub fn true_range(&self, previous_close: Option<f64>) -> f64 {
        match previous_close {
            Some(prev) => self
                .range()
                .max((self.high - prev).abs())
                .max((self.low - prev).abs()),
            None => self.range(),
        }
    }
}

pub trait Indicator {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64>;
}

/// Average True Range with Wilder smoothing
pub struct ATR {
    pub period: usize,
}

impl ATR {
    pub fn new(period: usize) -> Self {
        ATR { period }
    }

    /// Most recent ATR value, if there are enough candles
    pub fn latest(&self, candles: &[Candle]) -> Option<f64> {
        self.calculate(candles).last().copied()
    }
}

impl Indicator for ATR {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if self.period == 0 || candles.len() < self.period + 1 {
            return vec![];
        }

        // First candle has no previous close; start from the second
        let true_ranges: Vec<f64> = candles
            .windows(2)
            .map(|pair| pair[1].true_range(Some(pair[0].close)))
            .collect();

        let period = self.period as f64;
        let mut atr = true_ranges[..self.period].iter().sum::<f64>() / period;
        let mut values = Vec::with_capacity(true_ranges.len() - self.period + 1);
        values.push(atr);

        for tr in &true_ranges[self.period..] {
            atr = (atr * (period - 1.0) + tr) / period;
            values.push(atr);
        }

        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_true_range_uses_gap_from_previous_close() {
        let candle = Candle::new(105.0, 110.0, 104.0, 108.0, 1.0);
        assert_eq!(candle.true_range(None), 6.0);
        // Gap up from 100: high - prev close dominates
        assert_eq!(candle.true_range(Some(100.0)), 10.0);
    }

    #[test]
    fn test_atr_constant_range() {
        let candles: Vec<Candle> = (0..6)
            .map(|_| Candle::new(100.0, 102.0, 98.0, 100.0, 1.0))
            .collect();
        let atr = ATR::new(3).calculate(&candles);
        assert_eq!(atr.len(), 3);
        assert!(atr.iter().all(|v| (v - 4.0).abs() < 1e-9));
    }

    #[test]
    fn test_atr_wilder_smoothing() {
        let candles = vec![
            Candle::new(100.0, 101.0, 99.0, 100.0, 1.0),
            Candle::new(100.0, 102.0, 98.0, 100.0, 1.0), // tr 4
            Candle::new(100.0, 103.0, 97.0, 100.0, 1.0), // tr 6
            Candle::new(100.0, 110.0, 100.0, 100.0, 1.0), // tr 10
        ];
        let atr = ATR::new(2).calculate(&candles);
        assert_eq!(atr, vec![5.0, 7.5]);
        assert_eq!(ATR::new(2).latest(&candles), Some(7.5));
    }

    #[test]
    fn test_atr_insufficient_candles() {
        let candles = vec![Candle::new(100.0, 101.0, 99.0, 100.0, 1.0)];
        assert!(ATR::new(14).calculate(&candles).is_empty());
        assert!(ATR::new(0).latest(&candles).is_none());
    }
}
