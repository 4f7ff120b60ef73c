//! # Simulator Topology
//!
//! Wiring between a frontend and its simulator, chosen by configuration:
//! the simulator can run inside the frontend's loop, on its own thread, or
//! behind a socket.

use std::net::TcpStream;
use std::thread::JoinHandle;
use log::info;

use rigsync_shared::messages::{SimulatorReply, SimulatorRequest};
use rigsync_shared::stream::{channel_pair, direct_pair, DirectStream, FramedStream};
use rigsync_shared::{Stream, SyncConfig, SyncError, Topology};
use rigsync_simulator::{SimulationLogic, Simulator};

/// The frontend's end of the simulator stream
pub type SimulatorStream = Box<dyn Stream<SimulatorRequest, SimulatorReply>>;

/// What the frontend holds on to for its simulator
pub enum SimulatorLink {
    /// Simulator driven from the frontend's loop
    InLoop {
        simulator: Box<Simulator>,
        stream: DirectStream<SimulatorReply, SimulatorRequest>,
    },

    /// Simulator running on its own thread
    Thread(JoinHandle<Result<(), SyncError>>),

    /// Simulator owned by someone else
    Remote,
}

impl std::fmt::Debug for SimulatorLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InLoop { .. } => f.write_str("InLoop"),
            Self::Thread(_) => f.write_str("Thread"),
            Self::Remote => f.write_str("Remote"),
        }
    }
}

impl SimulatorLink {
    /// Let an in-loop simulator answer whatever it has been sent
    pub fn drive(&mut self) -> Result<usize, SyncError> {
        match self {
            Self::InLoop { simulator, stream } => simulator.poll(stream),
            _ => Ok(0),
        }
    }

    /// Wait for a threaded simulator to stop.
    ///
    /// The frontend's stream end must already be dropped, otherwise the
    /// simulator never sees the disconnect.
    pub fn join(self) -> Result<(), SyncError> {
        match self {
            Self::Thread(handle) => handle
                .join()
                .map_err(|_| SyncError::Transport("simulator thread panicked".to_string()))?,
            _ => Ok(()),
        }
    }
}

/// Start or connect to a simulator as configured.
///
/// `logic` runs in the simulator for the in-loop and thread topologies; a
/// socket simulator brings its own.
pub fn connect(
    config: &SyncConfig,
    logic: Box<dyn SimulationLogic>,
) -> Result<(SimulatorStream, SimulatorLink), SyncError> {
    match &config.topology {
        Topology::InLoop => {
            let (frontend, simulator_end) = direct_pair::<SimulatorRequest, SimulatorReply>();
            let simulator = Simulator::with_logic(config.clone(), logic);
            info!("Simulator running in the frontend loop");

            Ok((
                Box::new(frontend),
                SimulatorLink::InLoop { simulator: Box::new(simulator), stream: simulator_end },
            ))
        }
        Topology::Thread => {
            let (frontend, mut simulator_end) = channel_pair::<SimulatorRequest, SimulatorReply>();
            let simulator_config = config.clone();

            let handle = std::thread::Builder::new()
                .name("rigsync-simulator".to_string())
                .spawn(move || {
                    let mut simulator = Simulator::with_logic(simulator_config, logic);
                    simulator.run(&mut simulator_end)
                })
                .map_err(|e| SyncError::Transport(format!("failed to spawn simulator thread: {}", e)))?;
            info!("Simulator running on its own thread");

            Ok((Box::new(frontend), SimulatorLink::Thread(handle)))
        }
        Topology::Socket { address } => {
            let socket = TcpStream::connect(address.as_str())?;
            socket.set_nodelay(true)?;
            socket.set_nonblocking(true)?;
            info!("Connected to simulator at {}", address);

            let stream: FramedStream<TcpStream, SimulatorRequest, SimulatorReply> =
                FramedStream::with_max_frame_size(socket, config.max_frame_size);
            Ok((Box::new(stream), SimulatorLink::Remote))
        }
    }
}
