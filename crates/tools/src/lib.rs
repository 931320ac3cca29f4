//! Tool registry exposed to generated code.
//!
//! Four tools are offered: the user's location, county geocoding, local
//! weather (all mocked) and `call_llm`, which asks the model again through a
//! [`Completer`].

mod completer;
mod weather;

pub use completer::{Completer, NoModel};
pub use weather::{Coordinates, Location, Weather, WeatherTools, known_coordinates, signatures};

/// Python-style interface file describing the tools to the model.
pub const DEFAULT_INTERFACE_FILE: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/interfaces/weather_tools.py");

#[cfg(test)]
mod tests {
    use super::*;
    use policy::Policy;
    use sandbox::Executor;

    #[test]
    fn generated_code_can_chain_tools() {
        let tools = WeatherTools::new(NoModel).with_seed(1);
        let executor = Executor::new(tools, Policy::standard());
        let code = "\
def answer_user_question(question: str) -> str:
    county, state = get_user_location()
    lat, lon = get_geo_from_county(county, state)
    weather = get_local_weather(lat, lon)
    rain = weather.precipitation_chance_percent
    return f\"In {county}, {state} there is a {rain:.0f}% chance of rain.\"
";
        let answer = executor.execute(code, "is it going to rain today?");
        assert!(answer.starts_with("In King County, Washington there is a "), "{answer}");
        assert!(answer.ends_with("% chance of rain."), "{answer}");
    }
}
