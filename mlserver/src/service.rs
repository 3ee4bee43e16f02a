use std::{borrow::Cow, io};

use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg, Status},
};
use log::{info, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{Result, ServerErr, session::Session};

/// The request-routing surface over a `Session`.
///
/// Every request is processed to completion before the next one is read, so
/// the session needs no locking: mutual exclusion comes from the single
/// serving task. `Train` and `Predict` block that task for their duration.
pub struct Service {
    session: Session,
}

enum Reply {
    Ack,
    Status(Status),
    Predictions(Vec<u8>),
}

impl Service {
    /// Creates a new `Service`.
    ///
    /// # Arguments
    /// * `session` - The session holding the process-wide model state.
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Serves one client connection until it closes.
    ///
    /// Failed requests are answered with an error frame; the connection and the
    /// session state stay live for the next request.
    ///
    /// # Arguments
    /// * `rx` - The receiving end of the connection.
    /// * `tx` - The sending end of the connection.
    ///
    /// # Returns
    /// `Ok(())` when the client disconnects, or the underlying I/O error.
    pub async fn serve<R, W>(
        &mut self,
        mut rx: OnoReceiver<R>,
        mut tx: OnoSender<W>,
    ) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();

        loop {
            let msg: Msg = match rx.recv_into(&mut buf).await {
                Ok(msg) => msg,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e),
            };

            match self.dispatch(msg) {
                Ok(Reply::Ack) => tx.send(&Msg::Ack).await?,
                Ok(Reply::Status(status)) => tx.send(&Msg::Status(status)).await?,
                Ok(Reply::Predictions(scores)) => {
                    let msg = Msg::Predictions {
                        scores: &scores,
                        status: Status::NoError,
                    };
                    tx.send(&msg).await?;
                }
                Err(e) => {
                    warn!("request failed: {e}");
                    tx.send(&Msg::Err(Cow::Owned(e.to_string()))).await?;
                }
            }
        }
    }

    /// Routes one request to the session.
    fn dispatch(&mut self, msg: Msg<'_>) -> Result<Reply> {
        match msg {
            Msg::Control(Command::InitMlParams { sample_size }) => {
                self.session.init_params(sample_size);
                Ok(Reply::Ack)
            }
            Msg::Control(Command::Train) => {
                let report = self.session.train()?;
                info!(epochs = report.epochs(); "training finished");
                Ok(Reply::Ack)
            }
            Msg::Control(Command::Predict) => {
                let scores = self.session.predict()?;
                Ok(Reply::Predictions(scores))
            }
            Msg::Control(Command::Test) => Ok(Reply::Ack),
            Msg::TrainSample { label, pixels } => {
                self.session.append_training(pixels, label)?;
                Ok(Reply::Status(Status::NoError))
            }
            Msg::PredictSample(pixels) => {
                self.session.append_predict(pixels)?;
                Ok(Reply::Status(Status::NoError))
            }
            other => Err(ServerErr::UnexpectedMessage {
                got: msg_kind(&other),
            }),
        }
    }
}

fn msg_kind(msg: &Msg<'_>) -> &'static str {
    match msg {
        Msg::Err(_) => "err",
        Msg::Control(_) => "control",
        Msg::TrainSample { .. } => "train_sample",
        Msg::PredictSample(_) => "predict_sample",
        Msg::Ack => "ack",
        Msg::Status(_) => "status",
        Msg::Predictions { .. } => "predictions",
    }
}
