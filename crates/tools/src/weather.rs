//! Mock weather tools.

use std::cell::RefCell;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sandbox::{ParamType, Record, ToolCall, ToolError, ToolHost, ToolSpec, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Completer;

/// A (county, state) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub county: String,
    pub state: String,
}

impl Location {
    pub fn new(county: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            county: county.into(),
            state: state.into(),
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::new("King County", "Washington")
    }
}

impl From<Location> for Value {
    fn from(location: Location) -> Self {
        Value::tuple(vec![location.county.into(), location.state.into()])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<Coordinates> for Value {
    fn from(c: Coordinates) -> Self {
        Value::tuple(vec![c.latitude.into(), c.longitude.into()])
    }
}

/// A weather reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weather {
    pub temperature_fahrenheit: f64,
    /// 0.0 to 100.0
    pub precipitation_chance_percent: f64,
}

impl From<Weather> for Value {
    fn from(w: Weather) -> Self {
        Record::new("Weather")
            .field("temperature_fahrenheit", w.temperature_fahrenheit)
            .field("precipitation_chance_percent", w.precipitation_chance_percent)
            .into()
    }
}

const KNOWN_COUNTIES: [(&str, &str, f64, f64); 5] = [
    ("King County", "Washington", 47.6062, -122.3321),
    ("Los Angeles County", "California", 34.0522, -118.2437),
    ("Cook County", "Illinois", 41.8781, -87.6298),
    ("Harris County", "Texas", 29.7604, -95.3698),
    ("Maricopa County", "Arizona", 33.4484, -112.0740),
];

/// Coordinates for the counties the mock knows about.
pub fn known_coordinates(county: &str, state: &str) -> Option<Coordinates> {
    KNOWN_COUNTIES
        .iter()
        .find(|(c, s, _, _)| *c == county && *s == state)
        .map(|&(_, _, latitude, longitude)| Coordinates {
            latitude,
            longitude,
        })
}

/// Signatures of the four weather tools, in interface order.
pub fn signatures() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new("get_user_location", "tuple[str, str]")
            .description("Returns (county, state) of the user."),
        ToolSpec::new("get_geo_from_county", "tuple[float, float]")
            .param("county", ParamType::Str)
            .param("state", ParamType::Str)
            .description("Returns (latitude, longitude) of a county."),
        ToolSpec::new("get_local_weather", "Weather")
            .param("latitude", ParamType::Float)
            .param("longitude", ParamType::Float)
            .description("Returns current temperature and precipitation chance."),
        ToolSpec::new("call_llm", "str")
            .param("prompt", ParamType::Str)
            .description("Asks the model again with the given prompt."),
    ]
}

/// The weather tool registry: mock location, geocoding and weather data,
/// plus `call_llm` through a [`Completer`].
pub struct WeatherTools<C> {
    specs: Vec<ToolSpec>,
    location: Location,
    rng: RefCell<StdRng>,
    completer: C,
}

impl<C: Completer> WeatherTools<C> {
    pub fn new(completer: C) -> Self {
        Self {
            specs: signatures(),
            location: Location::default(),
            rng: RefCell::new(StdRng::from_entropy()),
            completer,
        }
    }

    /// Make the random mock data reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = RefCell::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn user_location(&self) -> Location {
        self.location.clone()
    }

    pub fn geo_from_county(&self, county: &str, state: &str) -> Coordinates {
        if let Some(coords) = known_coordinates(county, state) {
            return coords;
        }
        let mut rng = self.rng.borrow_mut();
        let coords = Coordinates {
            latitude: rng.gen_range(25.0..49.0),
            longitude: rng.gen_range(-125.0..-66.0),
        };
        debug!(county, state, ?coords, "generated mock coordinates");
        coords
    }

    pub fn local_weather(&self, coords: Coordinates) -> Weather {
        let mut rng = self.rng.borrow_mut();
        let celsius: f64 = rng.gen_range(-10.0..40.0);
        let weather = Weather {
            temperature_fahrenheit: celsius * 9.0 / 5.0 + 32.0,
            precipitation_chance_percent: rng.gen_range(0.0..100.0),
        };
        debug!(?coords, ?weather, "generated mock weather");
        weather
    }

    pub fn call_llm(&self, prompt: &str) -> Result<String, ToolError> {
        info!(prompt_len = prompt.len(), "calling model from generated code");
        debug!(prompt, "call_llm prompt");
        self.completer.complete(prompt)
    }
}

fn str_arg<'a>(call: &'a ToolCall, index: usize) -> Result<&'a str, ToolError> {
    call.args
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidInput(format!("{}: argument {index} must be str", call.name)))
}

fn float_arg(call: &ToolCall, index: usize) -> Result<f64, ToolError> {
    call.args
        .get(index)
        .and_then(Value::as_float)
        .ok_or_else(|| {
            ToolError::InvalidInput(format!("{}: argument {index} must be float", call.name))
        })
}

impl<C: Completer> ToolHost for WeatherTools<C> {
    fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        match call.name.as_str() {
            "get_user_location" => Ok(self.user_location().into()),
            "get_geo_from_county" => {
                let coords = self.geo_from_county(str_arg(call, 0)?, str_arg(call, 1)?);
                Ok(coords.into())
            }
            "get_local_weather" => {
                let coords = Coordinates {
                    latitude: float_arg(call, 0)?,
                    longitude: float_arg(call, 1)?,
                };
                Ok(self.local_weather(coords).into())
            }
            "call_llm" => self.call_llm(str_arg(call, 0)?).map(Value::from),
            other => Err(ToolError::NotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoModel;

    fn tools() -> WeatherTools<NoModel> {
        WeatherTools::new(NoModel).with_seed(7)
    }

    fn call(name: &str, args: Vec<Value>) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn location_is_constant() {
        let value = tools().execute(&call("get_user_location", vec![])).unwrap();
        assert_eq!(value.to_string(), "('King County', 'Washington')");
    }

    #[test]
    fn location_can_be_overridden() {
        let tools = tools().with_location(Location::new("Cook County", "Illinois"));
        assert_eq!(tools.user_location().state, "Illinois");
    }

    #[test]
    fn known_counties_have_fixed_coordinates() {
        let tools = tools();
        let coords = tools.geo_from_county("Harris County", "Texas");
        assert_eq!(
            coords,
            Coordinates {
                latitude: 29.7604,
                longitude: -95.3698
            }
        );
        let value = tools
            .execute(&call(
                "get_geo_from_county",
                vec!["King County".into(), "Washington".into()],
            ))
            .unwrap();
        assert_eq!(value.to_string(), "(47.6062, -122.3321)");
    }

    #[test]
    fn unknown_counties_get_continental_coordinates() {
        let tools = tools();
        for _ in 0..50 {
            let c = tools.geo_from_county("Nowhere County", "Atlantis");
            assert!((25.0..49.0).contains(&c.latitude));
            assert!((-125.0..-66.0).contains(&c.longitude));
        }
    }

    #[test]
    fn weather_stays_in_range() {
        let tools = tools();
        let coords = Coordinates {
            latitude: 47.6,
            longitude: -122.3,
        };
        for _ in 0..100 {
            let w = tools.local_weather(coords);
            assert!((14.0..104.0).contains(&w.temperature_fahrenheit));
            assert!((0.0..100.0).contains(&w.precipitation_chance_percent));
        }
    }

    #[test]
    fn seeded_runs_repeat() {
        let coords = Coordinates {
            latitude: 0.0,
            longitude: 0.0,
        };
        assert_eq!(tools().local_weather(coords), tools().local_weather(coords));
    }

    #[test]
    fn weather_is_a_record() {
        let value = tools()
            .execute(&call("get_local_weather", vec![Value::Float(1.0), Value::Float(2.0)]))
            .unwrap();
        let Value::Record(record) = value else {
            panic!("expected a record");
        };
        assert_eq!(record.type_name, "Weather");
        assert!(record.get("temperature_fahrenheit").is_some());
        assert!(record.get("precipitation_chance_percent").is_some());
    }

    #[test]
    fn call_llm_goes_through_the_completer() {
        let tools = WeatherTools::new(|prompt: &str| Ok::<_, ToolError>(format!("echo: {prompt}")));
        let value = tools.execute(&call("call_llm", vec!["hi".into()])).unwrap();
        assert_eq!(value, Value::from("echo: hi"));

        let err = self::tools()
            .execute(&call("call_llm", vec!["hi".into()]))
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }

    #[test]
    fn specs_match_interface() {
        let specs = signatures();
        let rendered: Vec<String> = specs.iter().map(ToolSpec::signature).collect();
        assert_eq!(
            rendered,
            [
                "get_user_location() -> tuple[str, str]",
                "get_geo_from_county(county: str, state: str) -> tuple[float, float]",
                "get_local_weather(latitude: float, longitude: float) -> Weather",
                "call_llm(prompt: str) -> str",
            ]
        );
        let interface = std::fs::read_to_string(crate::DEFAULT_INTERFACE_FILE).unwrap();
        for spec in &specs {
            assert!(interface.contains(&format!("def {}(", spec.name)));
        }
    }

    #[test]
    fn unknown_tool() {
        let err = tools().execute(&call("get_stock_price", vec![])).unwrap_err();
        assert_eq!(err, ToolError::NotFound("get_stock_price".into()));
    }
}
