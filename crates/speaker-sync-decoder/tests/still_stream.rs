use image::{Rgb, RgbImage};
use speaker_sync_decoder::{Backend, Configuration};
use tokio_stream::StreamExt;

#[tokio::test(flavor = "multi_thread")]
async fn still_backend_yields_single_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("portrait.png");
    let mut image = RgbImage::new(6, 4);
    image.put_pixel(5, 3, Rgb([10, 20, 30]));
    image.save(&path).unwrap();

    let mut config = Configuration::for_input(&path);
    config.still_fps = 30.0;
    assert_eq!(config.backend, Backend::Still);

    let provider = config.create_provider().expect("still backend available");
    assert!(provider.is_still());
    assert_eq!(provider.metadata().fps, Some(30.0));

    let mut stream = provider.into_stream();
    let mut frames = Vec::new();
    while let Some(frame) = stream.next().await {
        frames.push(frame.unwrap());
    }
    assert_eq!(frames.len(), 1);
    assert_eq!((frames[0].width(), frames[0].height()), (6, 4));
    assert_eq!(frames[0].to_image().get_pixel(5, 3).0, [10, 20, 30]);
}

#[tokio::test(flavor = "multi_thread")]
async fn mock_backend_produces_stream() {
    let config = Configuration {
        backend: Backend::Mock,
        ..Configuration::default()
    };
    let provider = config.create_provider().expect("mock backend available");
    let total = provider.metadata().total_frames;
    let mut stream = provider.into_stream();
    let mut count = 0u64;
    while let Some(frame) = stream.next().await {
        let frame = frame.unwrap();
        assert_eq!(frame.frame_index(), Some(count));
        count += 1;
    }
    assert_eq!(Some(count), total);
}
