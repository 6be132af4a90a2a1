//! Thermostat demo system.
//!
//! ```text
//!   Temperature Sensor ──temperature──► Controller ──demand──► Heater
//!          │
//!          └──temperature (cached)──► Readout   (connected late)
//! ```
//!
//! The readout is wired after the sensor has already reported, so it picks
//! up the cached reading on connection.

use mtb_core::{
    enum_param, record_param, ActionDecl, Args, Component, Declarations, Instance, ModelError,
    ParamDecl, PortIn, PortOut, System,
};
use serde::{Deserialize, Serialize};

/// Setpoints the controller accepts.
pub const SETPOINT_RANGE: std::ops::RangeInclusive<f64> = 5.0..=30.0;

/// Controller operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Auto,
    Off,
}

enum_param!(Mode { Auto, Off });

/// A named setpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub label: String,
    pub celsius: f64,
}

record_param!(Schedule {
    label: String,
    celsius: f64,
});

#[derive(Debug, Serialize)]
pub struct TemperatureSensor {
    pub reading: f64,
    #[serde(skip)]
    pub temperature: PortOut<f64>,
}

impl TemperatureSensor {
    pub fn new() -> Self {
        Self {
            reading: 20.0,
            temperature: PortOut::new("temperature"),
        }
    }
}

impl Default for TemperatureSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for TemperatureSensor {
    fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
        decl.port_out(&self.temperature)?;
        decl.action(
            ActionDecl::new("measure", |s: &mut Self, args: &mut Args| {
                s.reading = args.take()?;
                s.temperature.send(s.reading)
            })
            .param(ParamDecl::typed::<f64>("celsius").default_with(|s: &Self| s.reading)),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct Controller {
    pub mode: Mode,
    pub setpoint: f64,
    pub hysteresis: f64,
    pub heating: bool,
    pub last_reading: Option<f64>,
    pub schedule: Option<String>,
    #[serde(skip)]
    pub temperature: PortIn<f64>,
    #[serde(skip)]
    pub demand: PortOut<bool>,
}

impl Controller {
    pub fn new(setpoint: f64) -> Self {
        Self {
            mode: Mode::Auto,
            setpoint,
            hysteresis: 0.5,
            heating: false,
            last_reading: None,
            schedule: None,
            temperature: PortIn::new("temperature"),
            demand: PortOut::uncached("demand"),
        }
    }

    fn regulate(&mut self) -> Result<(), ModelError> {
        let heating = match (self.mode, self.last_reading) {
            (Mode::Off, _) | (_, None) => false,
            (Mode::Auto, Some(t)) if t < self.setpoint - self.hysteresis => true,
            (Mode::Auto, Some(t)) if t > self.setpoint + self.hysteresis => false,
            _ => self.heating,
        };
        if heating != self.heating {
            self.heating = heating;
            self.demand.send(heating)?;
        }
        Ok(())
    }
}

impl Component for Controller {
    fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
        decl.port_out(&self.demand)?;
        decl.receiver(
            &self.temperature,
            ActionDecl::new("on_temperature", |c: &mut Self, args: &mut Args| {
                c.last_reading = Some(args.take()?);
                c.regulate()
            })
            .param(ParamDecl::typed::<f64>("celsius")),
        )?;
        decl.action(
            ActionDecl::new("set_setpoint", |c: &mut Self, args: &mut Args| {
                let celsius: f64 = args.take()?;
                if !SETPOINT_RANGE.contains(&celsius) {
                    return Err(ModelError::rejected(
                        "set_setpoint",
                        format!("{} °C is outside {:?}", celsius, SETPOINT_RANGE),
                    ));
                }
                c.setpoint = celsius;
                c.regulate()
            })
            .param(ParamDecl::typed::<f64>("celsius").default_with(|c: &Self| c.setpoint)),
        )?;
        decl.action(
            ActionDecl::new("set_mode", |c: &mut Self, args: &mut Args| {
                c.mode = args.take()?;
                c.regulate()
            })
            .param(ParamDecl::typed::<Mode>("mode")),
        )?;
        decl.action(
            ActionDecl::new("apply_schedule", |c: &mut Self, args: &mut Args| {
                let schedule: Schedule = args.take()?;
                c.setpoint = schedule.celsius;
                c.schedule = Some(schedule.label);
                c.regulate()
            })
            .param(ParamDecl::typed::<Schedule>("schedule")),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct Heater {
    pub on: bool,
    pub switch_count: u32,
    #[serde(skip)]
    pub demand: PortIn<bool>,
}

impl Heater {
    pub fn new() -> Self {
        Self {
            on: false,
            switch_count: 0,
            demand: PortIn::new("demand"),
        }
    }
}

impl Component for Heater {
    fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
        decl.receiver(
            &self.demand,
            ActionDecl::new("switch", |h: &mut Self, args: &mut Args| {
                h.on = args.take()?;
                h.switch_count += 1;
                Ok(())
            })
            .param(ParamDecl::typed::<bool>("on")),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct Readout {
    pub lines: Vec<String>,
    #[serde(skip)]
    pub temperature: PortIn<f64>,
}

impl Readout {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            temperature: PortIn::new("temperature"),
        }
    }
}

impl Component for Readout {
    fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
        decl.receiver(
            &self.temperature,
            ActionDecl::new("show", |d: &mut Self, args: &mut Args| {
                let celsius: f64 = args.take()?;
                d.lines.push(format!("{:.1} °C", celsius));
                Ok(())
            })
            .param(ParamDecl::typed::<f64>("celsius")),
        )
    }
}

/// The wired thermostat and its system view.
pub struct Thermostat {
    pub sensor: Instance<TemperatureSensor>,
    pub controller: Instance<Controller>,
    pub heater: Instance<Heater>,
    pub display: Instance<Readout>,
    pub system: System,
}

impl Thermostat {
    /// Builds the components and wires sensor → controller → heater.
    ///
    /// The display stays unconnected until [`Thermostat::connect_display`].
    pub fn build(setpoint: f64) -> Result<Self, ModelError> {
        let sensor = Instance::new(TemperatureSensor::new())?;
        let controller = Instance::new(Controller::new(setpoint))?;
        let heater = Instance::new(Heater::new())?;
        let display = Instance::new(Readout::new())?;

        let reading = sensor.state().temperature.clone();
        let demand = controller.state().demand.clone();
        reading.connect_to(&controller.state().temperature.clone())?;
        demand.connect_to(&heater.state().demand.clone())?;

        let system = System::builder("Thermostat")
            .component("sensor", &sensor)
            .component("controller", &controller)
            .component("heater", &heater)
            .component("display", &display)
            .build()?;

        Ok(Self {
            sensor,
            controller,
            heater,
            display,
            system,
        })
    }

    /// Connects the display to the sensor's cached output.
    pub fn connect_display(&self) -> Result<(), ModelError> {
        let reading = self.sensor.state().temperature.clone();
        let input = self.display.state().temperature.clone();
        input.connect(&reading)
    }

    /// Reports a temperature through the sensor's `measure` action.
    pub fn measure(&self, celsius: f64) -> Result<(), ModelError> {
        self.sensor.invoke("measure", vec![serde_json::json!(celsius)])
    }
}
