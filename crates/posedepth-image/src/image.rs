use crate::error::ImageError;

/// Image size in pixels
///
/// A struct to represent the size of an image in pixels.
///
/// # Examples
///
/// ```
/// use posedepth_image::ImageSize;
///
/// let image_size = ImageSize {
///   width: 10,
///   height: 20,
/// };
///
/// assert_eq!(image_size.width, 10);
/// assert_eq!(image_size.height, 20);
/// assert_eq!(image_size.num_pixels(), 200);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageSize {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
}

impl ImageSize {
    /// Number of pixels covered by an image of this size.
    #[inline]
    pub fn num_pixels(&self) -> usize {
        self.width * self.height
    }

    /// Whether the pixel `(x, y)` lies inside the image.
    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "ImageSize {{ width: {}, height: {} }}",
            self.width, self.height
        )
    }
}

impl From<[usize; 2]> for ImageSize {
    fn from(size: [usize; 2]) -> Self {
        ImageSize {
            width: size[0],
            height: size[1],
        }
    }
}

/// A single-channel image.
///
/// Pixels are stored row-major: the value of pixel `(x, y)` lives at index
/// `y * width + x` of [`Image::as_slice`].
#[derive(Clone, Debug, PartialEq)]
pub struct Image<T> {
    size: ImageSize,
    data: Vec<T>,
}

impl<T> Image<T> {
    /// Create a new image from pixel data.
    ///
    /// # Arguments
    ///
    /// * `size` - The size of the image in pixels.
    /// * `data` - The pixel data of the image, row-major.
    ///
    /// # Errors
    ///
    /// If the length of the pixel data does not match the image size, an error is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use posedepth_image::{Image, ImageSize};
    ///
    /// let image = Image::<u16>::new(
    ///     ImageSize {
    ///         width: 10,
    ///         height: 20,
    ///     },
    ///     vec![0u16; 10 * 20],
    /// ).unwrap();
    ///
    /// assert_eq!(image.width(), 10);
    /// assert_eq!(image.height(), 20);
    /// ```
    pub fn new(size: ImageSize, data: Vec<T>) -> Result<Self, ImageError> {
        if data.len() != size.num_pixels() {
            return Err(ImageError::InvalidDataLength(data.len(), size.num_pixels()));
        }
        Ok(Self { size, data })
    }

    /// Create a new image with every pixel set to `val`.
    pub fn from_size_val(size: ImageSize, val: T) -> Self
    where
        T: Clone,
    {
        Self {
            size,
            data: vec![val; size.num_pixels()],
        }
    }

    /// Get the size of the image in pixels.
    #[inline]
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Get the width of the image in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.size.width
    }

    /// Get the height of the image in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.size.height
    }

    /// The pixel data, row-major.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The pixel data, row-major, mutable.
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consume the image and return its pixel data.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Get a reference to the pixel at `(x, y)`, or `None` when outside the image.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        if !self.size.contains(x, y) {
            return None;
        }
        self.data.get(y * self.size.width + x)
    }

    /// Set the pixel at `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::PixelIndexOutOfBounds`] when the pixel lies outside the image.
    pub fn set(&mut self, x: usize, y: usize, val: T) -> Result<(), ImageError> {
        if !self.size.contains(x, y) {
            return Err(ImageError::PixelIndexOutOfBounds(
                x,
                y,
                self.size.width,
                self.size.height,
            ));
        }
        self.data[y * self.size.width + x] = val;
        Ok(())
    }

    /// Apply `f` to every pixel in place.
    pub fn map_inplace(&mut self, f: impl Fn(&mut T)) {
        self.data.iter_mut().for_each(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_size() {
        let image_size = ImageSize {
            width: 10,
            height: 20,
        };
        assert_eq!(image_size.num_pixels(), 200);
        assert!(image_size.contains(9, 19));
        assert!(!image_size.contains(10, 0));
        assert!(!image_size.contains(0, 20));
        assert_eq!(ImageSize::from([3, 4]), ImageSize { width: 3, height: 4 });
    }

    #[test]
    fn image_new_invalid_length() {
        let res = Image::<f32>::new(
            ImageSize {
                width: 2,
                height: 2,
            },
            vec![0.0; 3],
        );
        assert_eq!(res, Err(ImageError::InvalidDataLength(3, 4)));
    }

    #[test]
    fn image_row_major_layout() -> Result<(), ImageError> {
        let image = Image::<u8>::new(
            ImageSize {
                width: 3,
                height: 2,
            },
            vec![0, 1, 2, 3, 4, 5],
        )?;
        assert_eq!(image.get(0, 0), Some(&0));
        assert_eq!(image.get(2, 0), Some(&2));
        assert_eq!(image.get(0, 1), Some(&3));
        assert_eq!(image.get(2, 1), Some(&5));
        assert_eq!(image.get(3, 1), None);
        Ok(())
    }

    #[test]
    fn image_set_out_of_bounds() {
        let mut image = Image::from_size_val(
            ImageSize {
                width: 2,
                height: 2,
            },
            0.0f32,
        );
        assert!(image.set(1, 1, 4.0).is_ok());
        assert_eq!(image.get(1, 1), Some(&4.0));
        assert_eq!(
            image.set(2, 0, 1.0),
            Err(ImageError::PixelIndexOutOfBounds(2, 0, 2, 2))
        );
    }
}
