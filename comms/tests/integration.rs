use std::borrow::Cow;

use comms::msg::{Command, Msg, Status};
use tokio::io::{self, AsyncReadExt};

async fn roundtrip(msg: Msg<'_>) {
    const SIZE: usize = 4096;

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    tx.send(&msg).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf = Vec::new();
    let got: Msg = rx.recv_into(&mut buf).await.unwrap();
    assert_eq!(got, msg);
}

#[tokio::test]
async fn send_recv_control() {
    roundtrip(Msg::Control(Command::InitMlParams { sample_size: 64 })).await;
    roundtrip(Msg::Control(Command::Train)).await;
    roundtrip(Msg::Control(Command::Predict)).await;
    roundtrip(Msg::Control(Command::Test)).await;
}

#[tokio::test]
async fn send_recv_train_sample() {
    let pixels: Vec<u8> = (0..48).collect();
    roundtrip(Msg::TrainSample {
        label: 1,
        pixels: &pixels,
    })
    .await;
}

#[tokio::test]
async fn send_recv_predict_sample() {
    let pixels = vec![255; 48];
    roundtrip(Msg::PredictSample(&pixels)).await;
}

#[tokio::test]
async fn send_recv_responses() {
    roundtrip(Msg::Ack).await;
    roundtrip(Msg::Status(Status::NoError)).await;
    roundtrip(Msg::Status(Status::NoOutData)).await;
    roundtrip(Msg::Predictions {
        scores: &[0, 127, 255],
        status: Status::NoError,
    })
    .await;
    roundtrip(Msg::Err(Cow::Borrowed("training buffer is empty"))).await;
}

#[tokio::test]
async fn send_recv_empty_predictions() {
    roundtrip(Msg::Predictions {
        scores: &[],
        status: Status::NoOutData,
    })
    .await;
}

#[tokio::test]
async fn frames_carry_length_prefix_then_kind_then_tail() {
    const SIZE: usize = 4096;

    let (one, mut two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    let pixels = [1u8, 2, 3, 4];
    tx.send(&Msg::PredictSample(&pixels)).await.unwrap();

    // 8-byte length prefix, 4-byte kind header, then the pixel tail.
    let mut frame = [0u8; 8 + 4 + 4];
    two.read_exact(&mut frame).await.unwrap();

    assert_eq!(u64::from_be_bytes(frame[..8].try_into().unwrap()), 8);
    assert_eq!(u32::from_be_bytes(frame[8..12].try_into().unwrap()), 3);
    assert_eq!(&frame[12..], &pixels);
}

#[tokio::test]
async fn recv_many_on_one_stream() {
    const SIZE: usize = 4096;

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    let pixels = vec![42; 12];
    tx.send(&Msg::Control(Command::InitMlParams { sample_size: 2 }))
        .await
        .unwrap();
    tx.send(&Msg::TrainSample {
        label: 0,
        pixels: &pixels,
    })
    .await
    .unwrap();
    tx.send(&Msg::Control(Command::Train)).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf = Vec::new();
    assert_eq!(
        rx.recv_into::<Msg>(&mut buf).await.unwrap(),
        Msg::Control(Command::InitMlParams { sample_size: 2 })
    );

    let mut buf = Vec::new();
    let Msg::TrainSample { label, pixels: got } = rx.recv_into(&mut buf).await.unwrap() else {
        panic!("expected a training sample");
    };
    assert_eq!(label, 0);
    assert_eq!(got, &pixels[..]);

    let mut buf = Vec::new();
    assert_eq!(
        rx.recv_into::<Msg>(&mut buf).await.unwrap(),
        Msg::Control(Command::Train)
    );
}
